//! Entity id allocation and unit storage.
//!
//! Ids start at 1. Released ids go into a free list and the smallest free id
//! is handed out before a fresh one, so an id is only reassigned after the
//! unit holding it has been removed.

use crate::unit::Unit;
use log::debug;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug)]
pub struct EntityRegistry {
    /// Live units indexed by their entity id
    units: HashMap<u32, Unit>,
    /// Next never-used id
    next_id: u32,
    /// Ids released by removed units, ready for reuse
    free_ids: BTreeSet<u32>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            units: HashMap::new(),
            next_id: 1,
            free_ids: BTreeSet::new(),
        }
    }

    /// Reserves an id for a unit about to be inserted.
    pub fn allocate_id(&mut self) -> u32 {
        if let Some(id) = self.free_ids.pop_first() {
            return id;
        }

        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Stores `unit` under its id, replacing nothing.
    ///
    /// Returns false if the id is already taken by a live unit.
    pub fn insert(&mut self, unit: Unit) -> bool {
        if self.units.contains_key(&unit.id) {
            return false;
        }

        self.free_ids.remove(&unit.id);
        if unit.id >= self.next_id {
            self.next_id = unit.id + 1;
        }
        self.units.insert(unit.id, unit);
        true
    }

    /// Removes a unit and releases its id.
    pub fn remove(&mut self, id: u32) -> Option<Unit> {
        let unit = self.units.remove(&id)?;
        self.free_ids.insert(id);
        debug!("Released entity id {}", id);
        Some(unit)
    }

    /// Gives back an id that was allocated but never inserted.
    pub fn release(&mut self, id: u32) {
        if !self.units.contains_key(&id) && id < self.next_id {
            self.free_ids.insert(id);
        }
    }

    pub fn get(&self, id: u32) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.units.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.units.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.units.values_mut()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Vec3;
    use std::collections::HashSet;

    fn monster(id: u32) -> Unit {
        Unit::new_monster(id, format!("Goblin {}", id), Vec3::ZERO, 0.0, 0, 100)
    }

    fn spawn(registry: &mut EntityRegistry) -> u32 {
        let id = registry.allocate_id();
        assert!(registry.insert(monster(id)));
        id
    }

    #[test]
    fn test_ids_start_at_one() {
        let mut registry = EntityRegistry::new();
        assert_eq!(spawn(&mut registry), 1);
        assert_eq!(spawn(&mut registry), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_released_id_reused_after_removal() {
        let mut registry = EntityRegistry::new();
        let a = spawn(&mut registry);
        let b = spawn(&mut registry);
        let _c = spawn(&mut registry);

        assert!(registry.remove(b).is_some());
        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());

        assert_eq!(spawn(&mut registry), a);
        assert_eq!(spawn(&mut registry), b);
        assert_eq!(spawn(&mut registry), 4);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut registry = EntityRegistry::new();
        let id = spawn(&mut registry);
        assert!(!registry.insert(monster(id)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_release_unused_allocation() {
        let mut registry = EntityRegistry::new();
        let id = registry.allocate_id();
        registry.release(id);
        assert_eq!(registry.allocate_id(), id);
    }

    #[test]
    fn test_interleaved_ids_stay_unique() {
        let mut registry = EntityRegistry::new();
        let mut live: Vec<u32> = Vec::new();

        for step in 0..200u32 {
            if step % 3 == 2 && !live.is_empty() {
                let victim = live.remove((step as usize * 7) % live.len());
                assert!(registry.remove(victim).is_some());
            } else {
                let id = spawn(&mut registry);
                assert!(!live.contains(&id));
                live.push(id);
            }

            let unique: HashSet<u32> = registry.ids().into_iter().collect();
            assert_eq!(unique.len(), registry.len());
            assert_eq!(registry.len(), live.len());
        }
    }
}
