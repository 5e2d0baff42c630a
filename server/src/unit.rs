//! Authoritative unit state.
//!
//! A [`Unit`] is the shared base every synchronized entity carries (position,
//! orientation, movement flags, health). What differs between players and
//! monsters lives in [`UnitKind`], and the attack bookkeeping is a separate
//! [`CombatState`] value owned by the unit.

use shared::{
    Health, MovementFlags, UnitSnapshot, Vec3, FLOOR_HEIGHT, GRAVITY, MAX_LEVEL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Controlled by the client bound to `session_id`
    Player { session_id: u32 },
    /// Server-controlled, respawns at its home position
    Monster,
}

/// Attack binding between a unit and its current target.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CombatState {
    pub target: Option<u32>,
    /// Time accumulated towards the next swing
    pub swing_timer_ms: f64,
}

impl CombatState {
    pub fn is_attacking(&self) -> bool {
        self.target.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Unit {
    pub id: u32,
    pub name: String,
    pub flags: MovementFlags,
    pub position: Vec3,
    pub orientation: f32,
    pub color: u32,
    pub health: Health,
    pub kind: UnitKind,
    /// Where a monster returns to when it respawns
    pub home: Vec3,
    pub combat: CombatState,
    pub level: u32,
    pub xp: u32,
    pub velocity_y: f32,
}

/// Experience awarded for a kill made at `level`.
pub fn xp_per_kill(level: u32) -> u32 {
    15 + 5 * level
}

/// Experience needed to advance from `level` to the next one.
pub fn xp_to_level_up(level: u32) -> u32 {
    (12.5 * level as f64 * xp_per_kill(level) as f64) as u32
}

impl Unit {
    fn new(
        id: u32,
        kind: UnitKind,
        name: String,
        position: Vec3,
        orientation: f32,
        color: u32,
        max_health: i32,
    ) -> Self {
        Self {
            id,
            name,
            flags: MovementFlags::empty(),
            position,
            orientation,
            color,
            health: Health::new(max_health),
            kind,
            home: position,
            combat: CombatState::default(),
            level: 1,
            xp: 0,
            velocity_y: 0.0,
        }
    }

    pub fn new_player(
        id: u32,
        session_id: u32,
        name: String,
        position: Vec3,
        orientation: f32,
        color: u32,
        max_health: i32,
    ) -> Self {
        Self::new(
            id,
            UnitKind::Player { session_id },
            name,
            position,
            orientation,
            color,
            max_health,
        )
    }

    pub fn new_monster(
        id: u32,
        name: String,
        position: Vec3,
        orientation: f32,
        color: u32,
        max_health: i32,
    ) -> Self {
        Self::new(
            id,
            UnitKind::Monster,
            name,
            position,
            orientation,
            color,
            max_health,
        )
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, UnitKind::Player { .. })
    }

    /// Session owning this unit, if it is a player.
    pub fn session_id(&self) -> Option<u32> {
        match self.kind {
            UnitKind::Player { session_id } => Some(session_id),
            UnitKind::Monster => None,
        }
    }

    /// Applies `amount` damage and returns the resulting health.
    pub fn damage(&mut self, amount: i32) -> i32 {
        self.health.damage(amount)
    }

    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Restores full health at `position` and forgets any attack in progress.
    pub fn respawn(&mut self, position: Vec3, orientation: f32) {
        self.position = position;
        self.orientation = orientation;
        self.velocity_y = 0.0;
        self.health.restore();
        self.combat = CombatState::default();
    }

    pub fn start_attack(&mut self, target: u32) {
        self.combat = CombatState {
            target: Some(target),
            swing_timer_ms: 0.0,
        };
    }

    pub fn stop_attack(&mut self) {
        self.combat = CombatState::default();
    }

    /// Adds experience, rolling surplus over into further levels.
    ///
    /// Returns the number of levels gained. Units at the level cap gain
    /// nothing.
    pub fn gain_xp(&mut self, amount: u32) -> u32 {
        if self.level >= MAX_LEVEL {
            return 0;
        }

        let start_level = self.level;
        self.xp += amount;

        while self.level < MAX_LEVEL && self.xp >= xp_to_level_up(self.level) {
            self.xp -= xp_to_level_up(self.level);
            self.level += 1;
        }

        if self.level >= MAX_LEVEL {
            self.xp = 0;
        }

        self.level - start_level
    }

    /// Integrates vertical motion and lands the unit on the floor.
    pub fn apply_gravity(&mut self, dt: f32) {
        self.velocity_y += GRAVITY * dt;
        self.position.y += self.velocity_y * dt;

        if self.position.y < FLOOR_HEIGHT {
            self.position.y = FLOOR_HEIGHT;
            self.velocity_y = 0.0;
        }
    }

    pub fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            id: self.id,
            flags: self.flags,
            name: self.name.clone(),
            position: self.position,
            orientation: self.orientation,
            color: self.color,
            max_health: self.health.max,
            current_health: self.health.current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Unit {
        Unit::new_player(
            1,
            10,
            "Nick".to_string(),
            Vec3::new(1.0, 0.0, 2.0),
            0.5,
            0xff0000,
            100,
        )
    }

    #[test]
    fn test_player_and_monster_kinds() {
        let player = player();
        assert!(player.is_player());
        assert_eq!(player.session_id(), Some(10));

        let monster = Unit::new_monster(2, "Goblin 1".into(), Vec3::ZERO, 0.0, 0x00ff00, 100);
        assert!(!monster.is_player());
        assert_eq!(monster.session_id(), None);
    }

    #[test]
    fn test_damage_and_respawn() {
        let mut unit = player();
        unit.start_attack(5);
        assert_eq!(unit.damage(30), 70);
        assert_eq!(unit.damage(100), 0);
        assert!(!unit.is_alive());

        unit.respawn(Vec3::new(4.0, 0.0, 4.0), 1.0);
        assert!(unit.is_alive());
        assert_eq!(unit.health.current, 100);
        assert_eq!(unit.position, Vec3::new(4.0, 0.0, 4.0));
        assert!(!unit.combat.is_attacking());
    }

    #[test]
    fn test_attack_binding() {
        let mut unit = player();
        unit.start_attack(7);
        unit.combat.swing_timer_ms = 300.0;

        // Re-targeting restarts the swing.
        unit.start_attack(8);
        assert_eq!(unit.combat.target, Some(8));
        assert_eq!(unit.combat.swing_timer_ms, 0.0);

        unit.stop_attack();
        assert_eq!(unit.combat, CombatState::default());
    }

    #[test]
    fn test_xp_curve() {
        assert_eq!(xp_per_kill(1), 20);
        assert_eq!(xp_to_level_up(1), 250);
        assert_eq!(xp_to_level_up(2), 625);
    }

    #[test]
    fn test_gain_xp_rolls_over() {
        let mut unit = player();
        assert_eq!(unit.gain_xp(240), 0);
        assert_eq!(unit.level, 1);

        assert_eq!(unit.gain_xp(20), 1);
        assert_eq!(unit.level, 2);
        assert_eq!(unit.xp, 10);

        assert_eq!(unit.gain_xp(1_000_000), MAX_LEVEL - 2);
        assert_eq!(unit.level, MAX_LEVEL);
        assert_eq!(unit.xp, 0);
        assert_eq!(unit.gain_xp(100), 0);
    }

    #[test]
    fn test_gravity_lands_on_floor() {
        let mut unit = player();
        unit.position.y = 1.0;

        for _ in 0..60 {
            unit.apply_gravity(1.0 / 20.0);
        }
        assert_eq!(unit.position.y, FLOOR_HEIGHT);
        assert_eq!(unit.velocity_y, 0.0);
    }

    #[test]
    fn test_snapshot_carries_visible_state() {
        let mut unit = player();
        unit.flags = MovementFlags::FORWARD;
        unit.damage(20);

        let snapshot = unit.snapshot();
        assert_eq!(snapshot.id, 1);
        assert_eq!(snapshot.name, "Nick");
        assert_eq!(snapshot.flags, MovementFlags::FORWARD);
        assert_eq!(snapshot.max_health, 100);
        assert_eq!(snapshot.current_health, 80);
        assert_eq!(snapshot.color, 0xff0000);
    }
}
