//! # Shared Game Library
//!
//! Types and algorithms used by both the authoritative server and the client:
//!
//! - [`math`]: the `Vec3` value type used for positions and velocities
//! - [`packets`]: the positional JSON-array wire codec and opcode table
//! - [`time_sync`]: round-trip probing and clock delta estimation
//! - [`netsim`]: the artificial latency/jitter/loss simulator
//!
//! Constants here define the shared simulation rules (movement speed, jump
//! height, gravity, combat tuning) so that the client's local simulation and
//! the server agree on what a movement flag means.

pub mod math;
pub mod netsim;
pub mod packets;
pub mod time_sync;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub use math::Vec3;

pub const UNIT_SPEED: f32 = 8.0;
pub const JUMP_HEIGHT: f32 = 2.25;
pub const GRAVITY: f32 = -9.81;
pub const FLOOR_HEIGHT: f32 = 0.0;

pub const DEFAULT_MAX_HEALTH: i32 = 100;
pub const ATTACK_RANGE: f32 = 2.5;
pub const ATTACK_COOLDOWN_MS: f64 = 1000.0;
pub const ATTACK_DAMAGE: i32 = 20;
pub const RESPAWN_DELAY_MS: f64 = 1000.0;
pub const MAX_LEVEL: u32 = 10;

/// Side length of the square area players and monsters spawn in.
pub const SPAWN_AREA: f32 = 15.0;

bitflags! {
    /// Movement input bitmask carried by Move/MoveUpdate/Welcome/Spawn.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MovementFlags: u8 {
        const FORWARD = 1;
        const BACKWARD = 2;
        const STRAFE_LEFT = 4;
        const STRAFE_RIGHT = 8;
        const JUMP = 16;
    }
}

impl MovementFlags {
    /// True if any horizontal movement bit is set.
    pub fn is_moving(&self) -> bool {
        self.intersects(
            MovementFlags::FORWARD
                | MovementFlags::BACKWARD
                | MovementFlags::STRAFE_LEFT
                | MovementFlags::STRAFE_RIGHT,
        )
    }

    /// Horizontal input direction in unit-local space, before rotation.
    ///
    /// Left wins over right and forward over backward when both are held.
    pub fn local_direction(&self) -> Vec3 {
        let x = if self.contains(MovementFlags::STRAFE_LEFT) {
            -1.0
        } else if self.contains(MovementFlags::STRAFE_RIGHT) {
            1.0
        } else {
            0.0
        };
        let z = if self.contains(MovementFlags::FORWARD) {
            -1.0
        } else if self.contains(MovementFlags::BACKWARD) {
            1.0
        } else {
            0.0
        };
        Vec3::new(x, 0.0, z)
    }
}

/// Hit points of a unit. `current` never drops below `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub current: i32,
    pub max: i32,
    pub min: i32,
}

impl Default for Health {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEALTH)
    }
}

impl Health {
    pub fn new(max: i32) -> Self {
        Self {
            current: max,
            max,
            min: 0,
        }
    }

    /// Subtracts `amount`, clamping at `min`. Returns the resulting health.
    pub fn damage(&mut self, amount: i32) -> i32 {
        self.current = (self.current - amount).max(self.min);
        self.current
    }

    pub fn is_alive(&self) -> bool {
        self.current > self.min
    }

    pub fn restore(&mut self) {
        self.current = self.max;
    }
}

/// Full visible state of a unit, as carried by Welcome and Spawn.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSnapshot {
    pub id: u32,
    pub flags: MovementFlags,
    pub name: String,
    pub position: Vec3,
    pub orientation: f32,
    pub color: u32,
    pub max_health: i32,
    pub current_health: i32,
}
