//! Client-side mirror of a unit.
//!
//! The local player's character integrates its own velocity directly
//! (prediction). Characters of other players and monsters are
//! remote-controlled and go through [`DeadReckoning`].

use crate::reconciliation::DeadReckoning;
use shared::{
    Health, MovementFlags, UnitSnapshot, Vec3, FLOOR_HEIGHT, GRAVITY, JUMP_HEIGHT, UNIT_SPEED,
};

#[derive(Debug, Clone)]
pub struct Character {
    pub id: u32,
    pub name: String,
    pub color: u32,
    pub flags: MovementFlags,
    pub orientation: f32,
    pub velocity: Vec3,
    pub health: Health,
    /// Set while this character is the local player's attack target
    pub targeted: bool,
    pub remote_controlled: bool,
    position: Vec3,
    reckoning: DeadReckoning,
}

impl Character {
    pub fn from_snapshot(snapshot: &UnitSnapshot, remote_controlled: bool) -> Self {
        let mut character = Self {
            id: snapshot.id,
            name: snapshot.name.clone(),
            color: snapshot.color,
            flags: MovementFlags::empty(),
            orientation: snapshot.orientation,
            velocity: Vec3::ZERO,
            health: Health {
                current: snapshot.current_health,
                max: snapshot.max_health,
                min: 0,
            },
            targeted: false,
            remote_controlled,
            position: snapshot.position,
            reckoning: DeadReckoning::new(snapshot.position),
        };
        character.set_flags(snapshot.flags);
        character
    }

    /// Position to draw this frame.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn reckoning(&self) -> &DeadReckoning {
        &self.reckoning
    }

    pub fn set_orientation(&mut self, orientation: f32) {
        self.orientation = orientation;
    }

    /// Derives horizontal velocity from `flags` and the current orientation,
    /// and starts a jump if the jump bit is set.
    pub fn set_flags(&mut self, flags: MovementFlags) {
        self.flags = flags;

        let direction = flags
            .local_direction()
            .rotate_y(self.orientation)
            .normalize();
        self.velocity.x = direction.x * UNIT_SPEED;
        self.velocity.z = direction.z * UNIT_SPEED;

        if flags.contains(MovementFlags::JUMP) {
            self.jump();
        }
    }

    pub fn jump(&mut self) {
        self.velocity.y = (2.0 * JUMP_HEIGHT * -GRAVITY).sqrt();
    }

    /// Applies a position from the server.
    ///
    /// Remote characters smooth the correction unless `skip_dead_reckoning`
    /// is set; the local character always snaps.
    pub fn set_position(&mut self, position: Vec3, skip_dead_reckoning: bool) {
        if !self.remote_controlled {
            self.position = position;
        } else if skip_dead_reckoning {
            self.reckoning.hard_set(position);
            self.position = position;
        } else {
            self.reckoning.correct(position);
        }
    }

    pub fn respawn(&mut self, position: Vec3, orientation: f32) {
        self.set_orientation(orientation);
        self.set_position(position, true);
        self.velocity = Vec3::ZERO;
        self.health.restore();
    }

    pub fn update(&mut self, dt: f32) {
        self.velocity.y += GRAVITY * dt;

        if self.remote_controlled {
            self.position = self.reckoning.advance(self.velocity, dt);
        } else {
            self.position = self.position.add(&self.velocity.scale(dt));
        }

        if self.position.y < FLOOR_HEIGHT {
            self.position.y = FLOOR_HEIGHT;
            self.velocity.y = 0.0;
            if self.remote_controlled {
                self.reckoning.clamp_height(FLOOR_HEIGHT);
            }
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.position.y == FLOOR_HEIGHT
    }

    pub fn is_walking(&self) -> bool {
        self.velocity.x != 0.0 || self.velocity.z != 0.0
    }

    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }
}
