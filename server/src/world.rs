//! The authoritative world.
//!
//! `World` owns every session and every unit and is only ever mutated from
//! the server's main loop: inbound packets are dispatched through
//! [`World::handle_packet`] and time advances through [`World::update`].
//! Nothing here performs I/O; packets are queued on each session's outbound
//! channel.
//!
//! Combat resolution does not talk to the transport directly for deaths and
//! respawns. It pushes [`WorldEvent`]s onto a queue that the tick drains
//! after simulation, which is where respawns get scheduled, experience is
//! awarded and `Respawn` is broadcast.

use crate::config::WorldConfig;
use crate::registry::EntityRegistry;
use crate::session::{Outgoing, Session, SessionState};
use crate::unit::{xp_per_kill, Unit};
use crate::utils::{generate_color, sanitize_chat, sanitize_name};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::packets::Packet;
use shared::{MovementFlags, Vec3, FLOOR_HEIGHT};
use std::collections::{BTreeMap, VecDeque};
use std::f32::consts::TAU;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    UnitDied { unit_id: u32, killer_id: Option<u32> },
    UnitRespawned { unit_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingRespawn {
    unit_id: u32,
    remaining_ms: f64,
}

pub struct World {
    config: WorldConfig,
    sessions: BTreeMap<u32, Session>,
    registry: EntityRegistry,
    events: VecDeque<WorldEvent>,
    respawns: Vec<PendingRespawn>,
    rng: StdRng,
    tick: u64,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Builds a world with a caller-provided random source and spawns the
    /// configured monsters.
    pub fn with_rng(config: WorldConfig, rng: StdRng) -> Self {
        let mut world = Self {
            config,
            sessions: BTreeMap::new(),
            registry: EntityRegistry::new(),
            events: VecDeque::new(),
            respawns: Vec::new(),
            rng,
            tick: 0,
        };

        for n in 1..=world.config.monster_count {
            world.spawn_monster(format!("Goblin {}", n));
        }

        info!(
            "World created with {} monsters at {}Hz",
            world.config.monster_count, world.config.tick_rate
        );
        world
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn session(&self, session_id: u32) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn unit(&self, unit_id: u32) -> Option<&Unit> {
        self.registry.get(unit_id)
    }

    pub fn unit_mut(&mut self, unit_id: u32) -> Option<&mut Unit> {
        self.registry.get_mut(unit_id)
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.registry.iter()
    }

    pub fn player_count(&self) -> usize {
        self.registry.iter().filter(|u| u.is_player()).count()
    }

    /// Unit owned by `session_id`, if the session is active.
    pub fn player_of(&self, session_id: u32) -> Option<&Unit> {
        let session = self.sessions.get(&session_id)?;
        self.registry.get(session.player_id?)
    }

    fn random_spawn(&mut self) -> (Vec3, f32) {
        let area = self.config.spawn_area;
        let position = Vec3::new(
            self.rng.gen_range(0.0..area),
            FLOOR_HEIGHT,
            self.rng.gen_range(0.0..area),
        );
        let orientation = self.rng.gen_range(0.0..TAU);
        (position, orientation)
    }

    fn spawn_monster(&mut self, name: String) -> u32 {
        let id = self.registry.allocate_id();
        let (position, orientation) = self.random_spawn();
        let color = generate_color(&mut self.rng);
        let monster = Unit::new_monster(
            id,
            name,
            position,
            orientation,
            color,
            self.config.max_health,
        );
        let snapshot = monster.snapshot();
        self.registry.insert(monster);
        self.broadcast(Packet::Spawn(snapshot), None);
        id
    }

    /// Registers a freshly accepted connection and queues the handshake.
    pub fn add_session(&mut self, session_id: u32, sender: mpsc::UnboundedSender<Outgoing>) {
        let mut session = Session::new(session_id, sender);
        session.begin_handshake();
        self.sessions.insert(session_id, session);
        info!("Session {} connected", session_id);
    }

    /// Tears down a session: cancels its clock sync, despawns its player
    /// and releases the player's id.
    pub fn remove_session(&mut self, session_id: u32) {
        let Some(mut session) = self.sessions.remove(&session_id) else {
            return;
        };
        session.close();

        if let Some(player_id) = session.player_id {
            if let Some(unit) = self.remove_unit(player_id) {
                info!("Player {} left the game", unit.name);
            }
        }
        info!("Session {} disconnected", session_id);
    }

    /// Removes a unit, broadcasting its despawn and dropping every attack
    /// and respawn that still refers to it.
    pub fn remove_unit(&mut self, unit_id: u32) -> Option<Unit> {
        let unit = self.registry.remove(unit_id)?;

        for other in self.registry.iter_mut() {
            if other.combat.target == Some(unit_id) {
                other.stop_attack();
            }
        }
        self.respawns.retain(|r| r.unit_id != unit_id);
        self.events.retain(|event| match event {
            WorldEvent::UnitDied { unit_id: id, .. } | WorldEvent::UnitRespawned { unit_id: id } => {
                *id != unit_id
            }
        });

        self.broadcast(Packet::Despawn { id: unit_id }, None);
        Some(unit)
    }

    /// Queues `packet` for every active session except `exclude`.
    pub fn broadcast(&self, packet: Packet, exclude: Option<u32>) {
        for session in self.sessions.values() {
            if !session.is_active() || Some(session.id) == exclude {
                continue;
            }
            session.send(packet.clone());
        }
    }

    /// Dispatches one decoded packet from `session_id`.
    ///
    /// `now` is the server clock in milliseconds, used for time sync.
    pub fn handle_packet(&mut self, session_id: u32, packet: Packet, now: u64) {
        if !self.sessions.contains_key(&session_id) {
            debug!("Packet from unknown session {}", session_id);
            return;
        }

        match packet {
            Packet::Hello { player_name } => self.handle_hello(session_id, &player_name, now),
            Packet::Move {
                flags,
                position,
                orientation,
            } => self.handle_move(session_id, flags, position, orientation),
            Packet::ChatMessage { message, .. } => self.handle_chat(session_id, &message),
            Packet::AttackStart { target_id } => self.handle_attack_start(session_id, target_id),
            Packet::AttackStop => self.handle_attack_stop(session_id),
            Packet::TimeSyncResponse {
                sequence_index,
                timestamp,
            } => self.handle_time_sync_response(session_id, sequence_index, timestamp, now),
            other => {
                warn!(
                    "Unexpected {:?} packet from session {}",
                    other.opcode(),
                    session_id
                );
            }
        }
    }

    fn handle_hello(&mut self, session_id: u32, player_name: &str, now: u64) {
        match self.sessions.get(&session_id) {
            Some(session) if session.state == SessionState::Handshaking => {}
            _ => {
                debug!("Ignoring Hello from session {} outside handshake", session_id);
                return;
            }
        }

        let id = self.registry.allocate_id();
        let name = sanitize_name(player_name, id);
        let (position, orientation) = self.random_spawn();
        let color = generate_color(&mut self.rng);
        let player = Unit::new_player(
            id,
            session_id,
            name.clone(),
            position,
            orientation,
            color,
            self.config.max_health,
        );
        let snapshot = player.snapshot();
        self.registry.insert(player);

        let others: Vec<Packet> = self
            .registry
            .iter()
            .filter(|unit| unit.id != id)
            .map(|unit| Packet::Spawn(unit.snapshot()))
            .collect();

        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.activate(id);
            session.send(Packet::Welcome(snapshot.clone()));
            for spawn in others {
                session.send(spawn);
            }

            let sequence_index = session.clock_sync.start(now);
            session.send(Packet::TimeSync { sequence_index });
        }

        self.broadcast(Packet::Spawn(snapshot), Some(session_id));
        info!("Player {} joined the game as unit {}", name, id);
    }

    fn handle_move(&mut self, session_id: u32, flags: MovementFlags, position: Vec3, orientation: f32) {
        let Some(player_id) = self.active_player_id(session_id) else {
            return;
        };
        let Some(unit) = self.registry.get_mut(player_id) else {
            return;
        };

        unit.flags = flags;
        unit.position = position;
        unit.orientation = orientation;

        self.broadcast(
            Packet::MoveUpdate {
                id: player_id,
                flags,
                position,
                orientation,
            },
            Some(session_id),
        );
    }

    fn handle_chat(&mut self, session_id: u32, message: &str) {
        let Some(player) = self.player_of(session_id) else {
            return;
        };
        let Some(message) = sanitize_chat(message) else {
            return;
        };

        let player_name = player.name.clone();
        debug!("Chat from {}: {}", player_name, message);
        self.broadcast(
            Packet::ChatMessage {
                player_name,
                message,
            },
            None,
        );
    }

    fn handle_attack_start(&mut self, session_id: u32, target_id: u32) {
        let Some(player_id) = self.active_player_id(session_id) else {
            return;
        };
        if player_id == target_id || !self.registry.contains(target_id) {
            debug!("Unit {} cannot attack unit {}", player_id, target_id);
            return;
        }

        if let Some(unit) = self.registry.get_mut(player_id) {
            unit.start_attack(target_id);
            debug!("Unit {} attacking unit {}", player_id, target_id);
        }
    }

    fn handle_attack_stop(&mut self, session_id: u32) {
        let Some(player_id) = self.active_player_id(session_id) else {
            return;
        };
        if let Some(unit) = self.registry.get_mut(player_id) {
            unit.stop_attack();
        }
    }

    fn handle_time_sync_response(
        &mut self,
        session_id: u32,
        sequence_index: u32,
        timestamp: u64,
        now: u64,
    ) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session
                .clock_sync
                .handle_response(sequence_index, timestamp, now);
        }
    }

    fn active_player_id(&self, session_id: u32) -> Option<u32> {
        let session = self.sessions.get(&session_id)?;
        if !session.is_active() {
            return None;
        }
        session.player_id
    }

    /// Advances the world by `dt_ms` milliseconds.
    ///
    /// Order within a tick: unit physics, attack resolution, respawn timers,
    /// world events, then clock sync probes.
    pub fn update(&mut self, dt_ms: f64, now: u64) {
        self.tick += 1;
        let dt = (dt_ms / 1000.0) as f32;

        for unit in self.registry.iter_mut() {
            if !unit.is_player() {
                unit.apply_gravity(dt);
            }
        }

        self.resolve_attacks(dt_ms);
        self.advance_respawns(dt_ms);
        self.process_events();
        self.update_clock_sync(dt_ms, now);
    }

    fn resolve_attacks(&mut self, dt_ms: f64) {
        let attackers: Vec<(u32, u32)> = self
            .registry
            .iter()
            .filter_map(|unit| unit.combat.target.map(|target| (unit.id, target)))
            .collect();

        for (attacker_id, target_id) in attackers {
            self.resolve_attack(attacker_id, target_id, dt_ms);
        }
    }

    fn resolve_attack(&mut self, attacker_id: u32, target_id: u32, dt_ms: f64) {
        let target_position = match self.registry.get(target_id) {
            Some(target) if target.is_alive() => target.position,
            _ => {
                if let Some(attacker) = self.registry.get_mut(attacker_id) {
                    attacker.stop_attack();
                }
                return;
            }
        };

        let Some(attacker) = self.registry.get_mut(attacker_id) else {
            return;
        };
        if !attacker.is_alive() {
            return;
        }

        attacker.combat.swing_timer_ms += dt_ms;
        if attacker.combat.swing_timer_ms < self.config.attack_cooldown_ms {
            return;
        }
        attacker.combat.swing_timer_ms = 0.0;

        if attacker.position.distance(&target_position) > self.config.attack_range {
            debug!("Unit {} out of range of unit {}", attacker_id, target_id);
            return;
        }

        let damage = self.config.attack_damage;
        let Some(target) = self.registry.get_mut(target_id) else {
            return;
        };
        let target_health = target.damage(damage);
        let died = !target.is_alive();

        self.broadcast(
            Packet::AttackSwing {
                attacker_id,
                target_id,
                damage,
                target_health,
            },
            None,
        );

        if died {
            self.events.push_back(WorldEvent::UnitDied {
                unit_id: target_id,
                killer_id: Some(attacker_id),
            });
        }
    }

    fn advance_respawns(&mut self, dt_ms: f64) {
        let mut due = Vec::new();
        self.respawns.retain_mut(|respawn| {
            respawn.remaining_ms -= dt_ms;
            if respawn.remaining_ms <= 0.0 {
                due.push(respawn.unit_id);
                false
            } else {
                true
            }
        });

        for unit_id in due {
            let Some((position, orientation)) = self.respawn_point(unit_id) else {
                continue;
            };
            if let Some(unit) = self.registry.get_mut(unit_id) {
                unit.respawn(position, orientation);
                self.events.push_back(WorldEvent::UnitRespawned { unit_id });
            }
        }
    }

    fn respawn_point(&mut self, unit_id: u32) -> Option<(Vec3, f32)> {
        let (is_player, home) = {
            let unit = self.registry.get(unit_id)?;
            (unit.is_player(), unit.home)
        };

        if is_player {
            Some(self.random_spawn())
        } else {
            Some((home, self.rng.gen_range(0.0..TAU)))
        }
    }

    /// Drains the event queue, performing the side effects of each event.
    pub fn process_events(&mut self) {
        while let Some(event) = self.events.pop_front() {
            match event {
                WorldEvent::UnitDied { unit_id, killer_id } => self.on_unit_died(unit_id, killer_id),
                WorldEvent::UnitRespawned { unit_id } => self.on_unit_respawned(unit_id),
            }
        }
    }

    fn on_unit_died(&mut self, unit_id: u32, killer_id: Option<u32>) {
        for unit in self.registry.iter_mut() {
            if unit.combat.target == Some(unit_id) {
                unit.stop_attack();
            }
        }
        if let Some(unit) = self.registry.get_mut(unit_id) {
            unit.stop_attack();
            info!("{} died", unit.name);
        }

        if let Some(killer) = killer_id.and_then(|id| self.registry.get_mut(id)) {
            let reward = xp_per_kill(killer.level);
            let levels = killer.gain_xp(reward);
            if levels > 0 {
                info!("{} reached level {}", killer.name, killer.level);
            }
        }

        if !self.respawns.iter().any(|r| r.unit_id == unit_id) {
            self.respawns.push(PendingRespawn {
                unit_id,
                remaining_ms: self.config.respawn_delay_ms,
            });
        }
    }

    fn on_unit_respawned(&mut self, unit_id: u32) {
        let Some(unit) = self.registry.get(unit_id) else {
            return;
        };

        debug!("{} respawned", unit.name);
        self.broadcast(
            Packet::Respawn {
                id: unit_id,
                position: unit.position,
                orientation: unit.orientation,
            },
            None,
        );
    }

    fn update_clock_sync(&mut self, dt_ms: f64, now: u64) {
        for session in self.sessions.values_mut() {
            if !session.is_active() {
                continue;
            }
            if let Some(sequence_index) = session.clock_sync.update(dt_ms, now) {
                session.send(Packet::TimeSync { sequence_index });
            }
        }
    }

    /// Translates a client timestamp from `session_id` onto the server clock.
    pub fn to_server_time(&self, session_id: u32, client_time: u64, now: u64) -> u64 {
        match self.sessions.get(&session_id) {
            Some(session) => session.clock_sync.to_server_time(client_time, now),
            None => now,
        }
    }

    /// Closes every session, used on shutdown.
    pub fn shutdown(&mut self) {
        let ids: Vec<u32> = self.sessions.keys().copied().collect();
        for session_id in ids {
            self.remove_session(session_id);
        }
        info!("World shut down after {} ticks", self.tick);
    }
}
