//! # Identifiers
//!
//! Every cross-boundary reference in EMBER is an opaque 64-bit value:
//! - [`EntityId`]: slot index plus generation, scoped to one world
//! - [`WorldId`]: key into the engine's world table
//! - [`ObjectId`]: key into the scripting layer's object heap
//!
//! None of them carry a pointer, so they stay meaningful across a reload
//! of the scripting layer.

use std::fmt;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index inside the owning world
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates a new entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Rebuilds an ID from its raw bits (as handed out to scripts).
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw 64-bit value.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

/// Identifier of a [`World`](crate::World).
///
/// World IDs start at 1 and are never reused by an engine. The value 0 is
/// reserved by the script entry points to address the global registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct WorldId(u64);

impl WorldId {
    /// Wraps a raw world ID.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world#{}", self.0)
    }
}

/// Identifier of an object living in the scripting layer's heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Wraps a raw object ID.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Generational slot allocator for the entities of one world.
///
/// Freed slots are recycled, but every reuse bumps the slot's generation so
/// an ID held past its entity's destruction resolves to "not found".
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Current generation of every slot ever handed out.
    generations: Vec<u32>,
    /// Liveness flag per slot.
    alive: Vec<bool>,
    /// Free list of slot indices for reuse.
    free: Vec<u32>,
    /// Number of currently alive entities.
    len: usize,
}

impl EntityAllocator {
    /// Creates a new, empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh entity ID. O(1) amortized.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX - 1` slots are requested.
    pub fn alloc(&mut self) -> EntityId {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            // Increment generation to invalidate old references
            let generation = self.generations[slot].wrapping_add(1);
            self.generations[slot] = generation;
            self.alive[slot] = true;
            return EntityId::new(index, generation);
        }

        let index = u32::try_from(self.generations.len())
            .ok()
            .filter(|i| *i != u32::MAX)
            .unwrap_or_else(|| panic!("entity slots exhausted"));
        self.generations.push(0);
        self.alive.push(true);
        EntityId::new(index, 0)
    }

    /// Frees an entity ID.
    ///
    /// Returns `false` if the ID was null, stale or already freed.
    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let slot = id.index() as usize;
        self.alive[slot] = false;
        self.free.push(id.index());
        self.len -= 1;
        true
    }

    /// Checks if an entity ID refers to a live entity.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }
        let slot = id.index() as usize;
        slot < self.alive.len() && self.alive[slot] && self.generations[slot] == id.generation()
    }

    /// Returns the number of live entities.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no entity is alive.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over live entity IDs in slot order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive
            .iter()
            .zip(&self.generations)
            .enumerate()
            .filter(|(_, (alive, _))| **alive)
            .map(|(index, (_, generation))| EntityId::new(index as u32, *generation))
    }

    /// Frees every entity at once.
    #[allow(clippy::cast_possible_truncation)]
    pub fn clear(&mut self) {
        for (index, alive) in self.alive.iter_mut().enumerate() {
            if *alive {
                *alive = false;
                self.free.push(index as u32);
            }
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_roundtrip() {
        let id = EntityId::new(12345, 67890);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.generation(), 67890);
        assert_eq!(EntityId::from_bits(id.to_bits()), id);
    }

    #[test]
    fn test_null_is_never_alive() {
        let allocator = EntityAllocator::new();
        assert!(EntityId::default().is_null());
        assert!(!allocator.is_alive(EntityId::NULL));
    }

    #[test]
    fn test_alloc_free_reuse() {
        let mut a = EntityAllocator::new();

        let one = a.alloc();
        let two = a.alloc();
        let three = a.alloc();

        assert_eq!(a.len(), 3);
        assert_ne!(one, two);
        assert_ne!(two, three);

        assert!(a.free(two));
        assert!(!a.free(two));
        assert_eq!(a.len(), 2);
        assert!(!a.is_alive(two));

        // Spawn again - should reuse the slot
        let four = a.alloc();
        assert_eq!(four.index(), two.index());
        assert_ne!(four.generation(), two.generation());
        assert!(!a.is_alive(two));
        assert!(a.is_alive(four));
    }

    #[test]
    fn test_iter_is_slot_ordered() {
        let mut a = EntityAllocator::new();
        let ids: Vec<_> = (0..4).map(|_| a.alloc()).collect();
        a.free(ids[1]);

        let live: Vec<_> = a.iter().collect();
        assert_eq!(live, vec![ids[0], ids[2], ids[3]]);

        a.clear();
        assert!(a.is_empty());
        assert_eq!(a.iter().count(), 0);
    }
}
