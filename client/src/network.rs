//! Headless client loop: socket events and fixed-rate frames, both applied to
//! the game from this one task.

use crate::config::ClientConfig;
use crate::game::ClientGame;
use crate::socket::{Socket, SocketEvent};
use crate::BoxError;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::MovementFlags;
use std::f32::consts::TAU;
use std::time::Instant;
use tokio::time::{interval, MissedTickBehavior};

/// Movement choices for the wander bot.
const WANDER_MOVES: [MovementFlags; 6] = [
    MovementFlags::empty(),
    MovementFlags::FORWARD,
    MovementFlags::BACKWARD,
    MovementFlags::STRAFE_LEFT,
    MovementFlags::STRAFE_RIGHT,
    MovementFlags::FORWARD.union(MovementFlags::JUMP),
];

pub struct Client {
    config: ClientConfig,
    game: ClientGame,
    rng: StdRng,
    wander_timer: f32,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: ClientConfig, rng: StdRng) -> Self {
        let game = ClientGame::new(config.player_name.clone());
        Self {
            config,
            game,
            rng,
            wander_timer: 0.0,
        }
    }

    pub fn game(&self) -> &ClientGame {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut ClientGame {
        &mut self.game
    }

    /// Picks a new random movement every one to three seconds.
    pub fn wander(&mut self, dt: f32) {
        if self.game.local().is_none() {
            return;
        }

        self.wander_timer -= dt;
        if self.wander_timer > 0.0 {
            return;
        }
        self.wander_timer = self.rng.gen_range(1.0..3.0);

        let flags = WANDER_MOVES[self.rng.gen_range(0..WANDER_MOVES.len())];
        let orientation = self.rng.gen_range(0.0..TAU);
        debug!("Wander: {:?} facing {:.2}", flags, orientation);
        self.game.set_input(flags, orientation);
    }

    /// Connects and runs until the server closes the connection.
    pub async fn run(&mut self) -> Result<(), BoxError> {
        let (mut socket, mut events) =
            Socket::connect(&self.config.server_url, self.config.preset).await?;
        if let Some(preset) = self.config.preset {
            info!("Simulating network conditions: {}", preset.label());
        }

        let started = Instant::now();
        let mut frame_interval = interval(self.config.frame_duration());
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                event = events.recv() => {
                    let now_ms = started.elapsed().as_millis() as u64;
                    match event {
                        Some(SocketEvent::Connected) => self.game.on_connected(),
                        Some(SocketEvent::Packet(packet)) => self.game.handle_packet(packet, now_ms),
                        Some(SocketEvent::Disconnected) | None => {
                            self.game.on_disconnected();
                            break;
                        }
                    }
                },

                _ = frame_interval.tick() => {
                    let frame_now = Instant::now();
                    let dt = frame_now.duration_since(last_frame).as_secs_f32();
                    last_frame = frame_now;

                    if self.config.wander {
                        self.wander(dt);
                    }
                    self.game.update(dt);
                    socket.update(f64::from(dt) * 1000.0);
                },
            }

            let outgoing = self.game.take_outgoing();
            socket.send_batch(&outgoing);
        }

        socket.close();
        Ok(())
    }

    pub fn shutdown(&mut self) {
        info!(
            "Client shutting down with {} units known",
            self.game.entities().len()
        );
    }
}
