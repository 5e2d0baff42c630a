//! Client game state: applies server packets to the local mirror, predicts
//! the local player, and decides what to send back.

use crate::character::Character;
use crate::entities::EntityManager;
use log::{debug, info, warn};
use shared::packets::Packet;
use shared::{MovementFlags, Vec3};
use std::collections::VecDeque;

/// While moving, the local position is re-sent this often (seconds).
pub const MOVE_RESEND_INTERVAL: f32 = 0.5;
pub const CHAT_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub player_name: String,
    pub message: String,
}

pub struct ClientGame {
    entities: EntityManager,
    player_name: String,
    target_id: Option<u32>,
    outbox: Vec<Packet>,
    move_timer: f32,
    last_sent: Option<(MovementFlags, f32)>,
    chat_log: VecDeque<ChatLine>,
}

impl ClientGame {
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            entities: EntityManager::new(),
            player_name: player_name.into(),
            target_id: None,
            outbox: Vec::new(),
            move_timer: 0.0,
            last_sent: None,
            chat_log: VecDeque::new(),
        }
    }

    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    pub fn local_id(&self) -> Option<u32> {
        self.entities.local_id()
    }

    pub fn local(&self) -> Option<&Character> {
        self.entities.local()
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn target_id(&self) -> Option<u32> {
        self.target_id
    }

    pub fn chat_log(&self) -> impl Iterator<Item = &ChatLine> {
        self.chat_log.iter()
    }

    /// Called once the handshake token arrives.
    pub fn on_connected(&mut self) {
        self.outbox.push(Packet::Hello {
            player_name: self.player_name.clone(),
        });
    }

    /// Forgets everything learned from the previous connection.
    pub fn on_disconnected(&mut self) {
        self.entities.clear();
        self.target_id = None;
        self.last_sent = None;
        self.move_timer = 0.0;
        self.outbox.clear();
    }

    /// Packets queued since the last call, in send order.
    pub fn take_outgoing(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    /// Applies one server packet. `now_ms` is the local clock used to answer
    /// time sync probes.
    pub fn handle_packet(&mut self, packet: Packet, now_ms: u64) {
        match packet {
            Packet::Welcome(snapshot) => {
                info!("Joined as {} (id {})", snapshot.name, snapshot.id);
                self.entities.clear();
                self.target_id = None;
                self.entities.add(Character::from_snapshot(&snapshot, false));
                self.entities.set_local(snapshot.id);
                self.last_sent = Some((
                    snapshot.flags.difference(MovementFlags::JUMP),
                    snapshot.orientation,
                ));
            }

            Packet::Spawn(snapshot) => {
                if Some(snapshot.id) == self.local_id() {
                    return;
                }
                debug!("Spawn {} (id {})", snapshot.name, snapshot.id);
                self.entities.add(Character::from_snapshot(&snapshot, true));
            }

            Packet::Despawn { id } => {
                if self.entities.remove(id).is_some() {
                    debug!("Despawn id {}", id);
                }
                if self.target_id == Some(id) {
                    self.target_id = None;
                }
            }

            Packet::MoveUpdate {
                id,
                flags,
                position,
                orientation,
            } => match self.entities.get_mut(id) {
                Some(character) => {
                    character.set_orientation(orientation);
                    character.set_flags(flags);
                    character.set_position(position, false);
                }
                None => debug!("MoveUpdate for unknown unit {}", id),
            },

            Packet::ChatMessage {
                player_name,
                message,
            } => {
                info!("[{}] {}", player_name, message);
                if self.chat_log.len() == CHAT_LOG_CAPACITY {
                    self.chat_log.pop_front();
                }
                self.chat_log.push_back(ChatLine {
                    player_name,
                    message,
                });
            }

            Packet::AttackSwing {
                attacker_id,
                target_id,
                damage,
                target_health,
            } => {
                if let Some(target) = self.entities.get_mut(target_id) {
                    target.health.current = target_health;
                }
                debug!(
                    "Unit {} hit {} for {} ({} left)",
                    attacker_id, target_id, damage, target_health
                );
            }

            Packet::Respawn {
                id,
                position,
                orientation,
            } => {
                if let Some(character) = self.entities.get_mut(id) {
                    character.respawn(position, orientation);
                }
                if Some(id) == self.local_id() {
                    // Whatever was held before dying no longer applies.
                    self.last_sent = None;
                }
            }

            Packet::TimeSync { sequence_index } => {
                self.outbox.push(Packet::TimeSyncResponse {
                    sequence_index,
                    timestamp: now_ms,
                });
            }

            other => warn!("Unexpected {:?} from server", other.opcode()),
        }
    }

    /// Applies new local input. A Move goes out immediately when the flags
    /// or orientation differ from what was last sent.
    ///
    /// `JUMP` is an edge: it only counts while the local player is grounded,
    /// rides on the Move that starts the jump, and is then cleared from the
    /// local flags so periodic resends never carry it.
    pub fn set_input(&mut self, flags: MovementFlags, orientation: f32) {
        let Some(local) = self.entities.local_mut() else {
            return;
        };
        let held = flags.difference(MovementFlags::JUMP);
        let jumping = flags.contains(MovementFlags::JUMP) && local.is_grounded();
        if !jumping && self.last_sent == Some((held, orientation)) {
            return;
        }

        let sent = if jumping {
            held | MovementFlags::JUMP
        } else {
            held
        };
        local.set_orientation(orientation);
        local.set_flags(sent);
        local.flags = held;
        let position = local.position();
        self.queue_move(sent, position, orientation);
        self.move_timer = 0.0;
    }

    /// Advances every character by `dt` seconds and re-sends the local
    /// position every [`MOVE_RESEND_INTERVAL`] while it is moving.
    pub fn update(&mut self, dt: f32) {
        self.entities.update(dt);

        let Some(local) = self.entities.local() else {
            return;
        };
        if !local.flags.is_moving() {
            self.move_timer = 0.0;
            return;
        }

        self.move_timer += dt;
        if self.move_timer >= MOVE_RESEND_INTERVAL {
            // Carry the remainder so the cadence does not drift with frame time.
            self.move_timer -= MOVE_RESEND_INTERVAL;
            let flags = local.flags.difference(MovementFlags::JUMP);
            let (position, orientation) = (local.position(), local.orientation);
            self.queue_move(flags, position, orientation);
        }
    }

    fn queue_move(&mut self, flags: MovementFlags, position: Vec3, orientation: f32) {
        self.outbox.push(Packet::Move {
            flags,
            position,
            orientation,
        });
        self.last_sent = Some((flags.difference(MovementFlags::JUMP), orientation));
    }

    /// Selects (or clears) the attack target. Returns false if `target` is
    /// the local player or an unknown unit.
    pub fn set_target(&mut self, target: Option<u32>) -> bool {
        if target == self.target_id {
            return true;
        }
        if let Some(id) = target {
            if Some(id) == self.local_id() || self.entities.get(id).is_none() {
                return false;
            }
        }

        if let Some(previous) = self.target_id.and_then(|id| self.entities.get_mut(id)) {
            previous.targeted = false;
        }

        self.target_id = target;
        match target {
            Some(id) => {
                if let Some(character) = self.entities.get_mut(id) {
                    character.targeted = true;
                }
                self.outbox.push(Packet::AttackStart { target_id: id });
            }
            None => self.outbox.push(Packet::AttackStop),
        }
        true
    }

    pub fn send_chat(&mut self, message: impl Into<String>) {
        self.outbox.push(Packet::ChatMessage {
            player_name: self.player_name.clone(),
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::UnitSnapshot;

    fn snapshot(id: u32, name: &str, position: Vec3) -> UnitSnapshot {
        UnitSnapshot {
            id,
            flags: MovementFlags::empty(),
            name: name.to_string(),
            position,
            orientation: 0.0,
            color: 0xff0000,
            max_health: 100,
            current_health: 100,
        }
    }

    fn joined() -> ClientGame {
        let mut game = ClientGame::new("Nick");
        game.on_connected();
        game.handle_packet(Packet::Welcome(snapshot(1, "Nick", Vec3::ZERO)), 0);
        game.handle_packet(
            Packet::Spawn(snapshot(2, "Goblin 1", Vec3::new(5.0, 0.0, 5.0))),
            0,
        );
        game.take_outgoing();
        game
    }

    #[test]
    fn test_connect_sends_hello() {
        let mut game = ClientGame::new("Nick");
        game.on_connected();
        assert_eq!(
            game.take_outgoing(),
            vec![Packet::Hello {
                player_name: "Nick".into()
            }]
        );
        assert!(game.take_outgoing().is_empty());
    }

    #[test]
    fn test_welcome_and_spawn() {
        let game = joined();
        assert_eq!(game.local_id(), Some(1));
        assert!(!game.local().map(|c| c.remote_controlled).unwrap_or(true));
        assert!(game.entities().get(2).map(|c| c.remote_controlled).unwrap_or(false));
        assert_eq!(game.entities().len(), 2);
    }

    #[test]
    fn test_input_change_sends_move_once() {
        let mut game = joined();
        game.set_input(MovementFlags::FORWARD, 0.0);
        game.set_input(MovementFlags::FORWARD, 0.0);

        let sent = game.take_outgoing();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            sent[0],
            Packet::Move { flags, .. } if flags == MovementFlags::FORWARD
        ));
    }

    #[test]
    fn test_move_resent_while_moving() {
        let mut game = joined();
        game.set_input(MovementFlags::FORWARD, 0.0);
        game.take_outgoing();

        for _ in 0..4 {
            game.update(0.1);
        }
        assert!(game.take_outgoing().is_empty());

        game.update(0.15);
        let sent = game.take_outgoing();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Packet::Move { position, .. } => assert!(position.z < 0.0),
            other => panic!("expected Move, got {:?}", other),
        }

        game.set_input(MovementFlags::empty(), 0.0);
        game.take_outgoing();
        for _ in 0..20 {
            game.update(0.1);
        }
        assert!(game.take_outgoing().is_empty());
    }

    #[test]
    fn test_resend_keeps_cadence() {
        let mut game = joined();
        game.set_input(MovementFlags::FORWARD, 0.0);
        game.take_outgoing();

        game.update(0.3);
        game.update(0.3);
        assert_eq!(game.take_outgoing().len(), 1);

        // The 0.1 s overshoot carries into the next interval.
        game.update(0.4);
        assert_eq!(game.take_outgoing().len(), 1);
    }

    #[test]
    fn test_jump_rides_only_on_first_move() {
        let mut game = joined();
        let jump = MovementFlags::FORWARD | MovementFlags::JUMP;
        game.set_input(jump, 0.0);

        let sent = game.take_outgoing();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Packet::Move { flags, .. } if flags == jump));
        assert_eq!(game.local().map(|c| c.flags), Some(MovementFlags::FORWARD));

        // Airborne presses are ignored.
        game.update(0.1);
        game.set_input(jump, 0.0);
        assert!(game.take_outgoing().is_empty());

        for _ in 0..180 {
            game.set_input(MovementFlags::FORWARD, 0.0);
            game.update(1.0 / 60.0);
        }
        let resent = game.take_outgoing();
        assert!(resent.len() >= 5);
        assert!(resent.iter().all(|p| matches!(
            p,
            Packet::Move { flags, .. } if *flags == MovementFlags::FORWARD
        )));
        assert!(game.local().map(|c| c.is_grounded()).unwrap_or(false));
    }

    #[test]
    fn test_move_update_smooths_remote() {
        let mut game = joined();
        game.handle_packet(
            Packet::MoveUpdate {
                id: 2,
                flags: MovementFlags::empty(),
                position: Vec3::new(6.0, 0.0, 5.0),
                orientation: 1.0,
            },
            0,
        );

        let goblin = game.entities().get(2).expect("goblin");
        assert_eq!(goblin.orientation, 1.0);
        assert_eq!(goblin.reckoning().position(), Vec3::new(6.0, 0.0, 5.0));
        assert_eq!(goblin.reckoning().error(), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_time_sync_is_answered() {
        let mut game = joined();
        game.handle_packet(Packet::TimeSync { sequence_index: 3 }, 12_345);
        assert_eq!(
            game.take_outgoing(),
            vec![Packet::TimeSyncResponse {
                sequence_index: 3,
                timestamp: 12_345
            }]
        );
    }

    #[test]
    fn test_targeting() {
        let mut game = joined();
        assert!(!game.set_target(Some(1)));
        assert!(!game.set_target(Some(99)));
        assert!(game.take_outgoing().is_empty());

        assert!(game.set_target(Some(2)));
        assert!(game.entities().get(2).map(|c| c.targeted).unwrap_or(false));
        assert_eq!(
            game.take_outgoing(),
            vec![Packet::AttackStart { target_id: 2 }]
        );

        assert!(game.set_target(None));
        assert!(!game.entities().get(2).map(|c| c.targeted).unwrap_or(true));
        assert_eq!(game.take_outgoing(), vec![Packet::AttackStop]);
    }

    #[test]
    fn test_despawn_clears_target() {
        let mut game = joined();
        game.set_target(Some(2));
        game.handle_packet(Packet::Despawn { id: 2 }, 0);

        assert_eq!(game.target_id(), None);
        assert!(game.entities().get(2).is_none());
    }

    #[test]
    fn test_swing_then_respawn() {
        let mut game = joined();
        game.handle_packet(
            Packet::AttackSwing {
                attacker_id: 1,
                target_id: 2,
                damage: 100,
                target_health: 0,
            },
            0,
        );
        assert!(!game.entities().get(2).map(|c| c.is_alive()).unwrap_or(true));

        game.handle_packet(
            Packet::Respawn {
                id: 2,
                position: Vec3::new(1.0, 0.0, 1.0),
                orientation: 0.5,
            },
            0,
        );
        let goblin = game.entities().get(2).expect("goblin");
        assert!(goblin.is_alive());
        assert_eq!(goblin.health.current, 100);
        assert_eq!(goblin.position(), Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_chat_log_is_bounded() {
        let mut game = joined();
        for i in 0..CHAT_LOG_CAPACITY + 5 {
            game.handle_packet(
                Packet::ChatMessage {
                    player_name: "Bob".into(),
                    message: format!("msg {}", i),
                },
                0,
            );
        }
        let log: Vec<_> = game.chat_log().collect();
        assert_eq!(log.len(), CHAT_LOG_CAPACITY);
        assert_eq!(log[0].message, "msg 5");
    }
}
