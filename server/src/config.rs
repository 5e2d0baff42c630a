//! Tunables for the authoritative world.

use shared::{
    ATTACK_COOLDOWN_MS, ATTACK_DAMAGE, ATTACK_RANGE, DEFAULT_MAX_HEALTH, RESPAWN_DELAY_MS,
    SPAWN_AREA,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    /// World updates per second
    pub tick_rate: u32,
    /// Monsters created when the world starts
    pub monster_count: usize,
    pub attack_range: f32,
    pub attack_cooldown_ms: f64,
    pub attack_damage: i32,
    pub respawn_delay_ms: f64,
    /// Side length of the square spawn area starting at the origin
    pub spawn_area: f32,
    pub max_health: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            monster_count: 0,
            attack_range: ATTACK_RANGE,
            attack_cooldown_ms: ATTACK_COOLDOWN_MS,
            attack_damage: ATTACK_DAMAGE,
            respawn_delay_ms: RESPAWN_DELAY_MS,
            spawn_area: SPAWN_AREA,
            max_health: DEFAULT_MAX_HEALTH,
        }
    }
}

impl WorldConfig {
    /// Time between two world ticks. A zero tick rate is treated as 1Hz.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate.max(1)))
    }
}
