//! Client-side mirror of every unit the server has told us about

use crate::character::Character;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct EntityManager {
    characters: HashMap<u32, Character>,
    local_id: Option<u32>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the character with the same id.
    pub fn add(&mut self, character: Character) {
        self.characters.insert(character.id, character);
    }

    pub fn remove(&mut self, id: u32) -> Option<Character> {
        if self.local_id == Some(id) {
            self.local_id = None;
        }
        self.characters.remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    pub fn local_id(&self) -> Option<u32> {
        self.local_id
    }

    pub fn set_local(&mut self, id: u32) {
        self.local_id = Some(id);
    }

    pub fn local(&self) -> Option<&Character> {
        self.local_id.and_then(|id| self.characters.get(&id))
    }

    pub fn local_mut(&mut self) -> Option<&mut Character> {
        match self.local_id {
            Some(id) => self.characters.get_mut(&id),
            None => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Advances every character by one frame.
    pub fn update(&mut self, dt: f32) {
        for character in self.characters.values_mut() {
            character.update(dt);
        }
    }

    pub fn clear(&mut self) {
        self.characters.clear();
        self.local_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{MovementFlags, UnitSnapshot, Vec3};

    fn character(id: u32, remote: bool) -> Character {
        let snapshot = UnitSnapshot {
            id,
            flags: MovementFlags::empty(),
            name: format!("Unit{}", id),
            position: Vec3::ZERO,
            orientation: 0.0,
            color: 0,
            max_health: 100,
            current_health: 100,
        };
        Character::from_snapshot(&snapshot, remote)
    }

    #[test]
    fn test_local_lookup() {
        let mut entities = EntityManager::new();
        entities.add(character(1, false));
        entities.add(character(2, true));
        assert!(entities.local().is_none());

        entities.set_local(1);
        assert_eq!(entities.local().map(|c| c.id), Some(1));
        assert_eq!(entities.len(), 2);
    }

    #[test]
    fn test_remove_local_clears_local_id() {
        let mut entities = EntityManager::new();
        entities.add(character(1, false));
        entities.set_local(1);

        assert!(entities.remove(1).is_some());
        assert!(entities.local_id().is_none());
        assert!(entities.is_empty());
        assert!(entities.remove(1).is_none());
    }

    #[test]
    fn test_update_moves_every_character() {
        let mut entities = EntityManager::new();
        entities.add(character(1, false));
        entities.add(character(2, true));
        for c in [1, 2] {
            if let Some(character) = entities.get_mut(c) {
                character.set_flags(MovementFlags::STRAFE_RIGHT);
            }
        }

        entities.update(0.5);
        for c in entities.iter() {
            assert!(c.position().x > 0.0, "unit {} did not move", c.id);
        }
    }
}
