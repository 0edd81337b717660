//! # World Directory
//!
//! Script-facing read path into worlds and registries.
//!
//! Native entry points run while a pass holds the world mutably, so they can
//! never borrow a store. Each world and the global registry instead publish a
//! [`ScopeView`]: the entity allocator itself plus presence sets of component
//! and system types, kept in step by the owning store and registry. The
//! [`WorldDirectory`] maps world IDs to those views.
//!
//! ```text
//! World ──owns──> ComponentStore ──marks──┐
//!   │             SystemRegistry ──marks──┤
//!   └─allocates─────────────────────────> ScopeView <── WorldDirectory <── natives
//! ```
//!
//! Locks are held for a single lookup or update and never across a hook call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::id::{EntityAllocator, EntityId, WorldId};
use crate::type_id::TypeHash;

/// Shared view of one scope: a world, or the global registry.
#[derive(Debug, Default)]
pub struct ScopeView {
    entities: Mutex<EntityAllocator>,
    components: RwLock<HashSet<(EntityId, TypeHash)>>,
    systems: RwLock<HashSet<TypeHash>>,
}

impl ScopeView {
    /// Creates an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an entity. The ID is alive as soon as this returns.
    pub fn alloc_entity(&self) -> EntityId {
        self.entities.lock().alloc()
    }

    /// Frees an entity. Returns `false` if it was not alive.
    pub fn free_entity(&self, entity: EntityId) -> bool {
        self.entities.lock().free(entity)
    }

    /// Checks if `entity` is alive.
    #[must_use]
    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.entities.lock().is_alive(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.lock().len()
    }

    /// Live entities in slot order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        self.entities.lock().iter().collect()
    }

    /// Frees every entity.
    pub fn clear_entities(&self) {
        self.entities.lock().clear();
    }

    /// Checks if `entity` has a component of type `hash`.
    #[must_use]
    pub fn has_component(&self, entity: EntityId, hash: TypeHash) -> bool {
        self.components.read().contains(&(entity, hash))
    }

    /// Checks if a system of type `hash` is registered.
    #[must_use]
    pub fn has_system(&self, hash: TypeHash) -> bool {
        self.systems.read().contains(&hash)
    }

    pub(crate) fn mark_component(&self, entity: EntityId, hash: TypeHash, present: bool) {
        let mut components = self.components.write();
        if present {
            components.insert((entity, hash));
        } else {
            components.remove(&(entity, hash));
        }
    }

    pub(crate) fn clear_components(&self) {
        self.components.write().clear();
    }

    pub(crate) fn mark_system(&self, hash: TypeHash, present: bool) {
        let mut systems = self.systems.write();
        if present {
            systems.insert(hash);
        } else {
            systems.remove(&hash);
        }
    }

    pub(crate) fn clear_systems(&self) {
        self.systems.write().clear();
    }
}

/// Process-wide table of scope views, keyed by world (`None` = global).
///
/// Cloning shares the table.
#[derive(Clone, Debug, Default)]
pub struct WorldDirectory {
    scopes: Arc<RwLock<HashMap<Option<WorldId>, Arc<ScopeView>>>>,
}

impl WorldDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the view of a scope, replacing any previous one.
    pub fn insert(&self, scope: Option<WorldId>, view: Arc<ScopeView>) {
        self.scopes.write().insert(scope, view);
    }

    /// Withdraws a scope. Returns `false` if it was not published.
    pub fn remove(&self, scope: Option<WorldId>) -> bool {
        self.scopes.write().remove(&scope).is_some()
    }

    /// The view of a scope.
    #[must_use]
    pub fn get(&self, scope: Option<WorldId>) -> Option<Arc<ScopeView>> {
        self.scopes.read().get(&scope).cloned()
    }

    /// Number of published scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.read().len()
    }

    /// Returns `true` if nothing is published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_marks() {
        let view = ScopeView::new();
        let e = view.alloc_entity();
        let hash = TypeHash::of("Test.A");
        assert!(view.has_entity(e));
        assert!(!view.has_component(e, hash));

        view.mark_component(e, hash, true);
        view.mark_system(hash, true);
        assert!(view.has_component(e, hash));
        assert!(view.has_system(hash));

        view.mark_component(e, hash, false);
        view.clear_systems();
        assert!(!view.has_component(e, hash));
        assert!(!view.has_system(hash));

        assert!(view.free_entity(e));
        assert!(!view.has_entity(e));
    }

    #[test]
    fn test_directory_is_shared_between_clones() {
        let directory = WorldDirectory::new();
        let remote = directory.clone();
        let w = WorldId::new(3);

        directory.insert(Some(w), Arc::new(ScopeView::new()));
        assert!(remote.get(Some(w)).is_some());
        assert!(remote.get(None).is_none());

        assert!(remote.remove(Some(w)));
        assert!(directory.is_empty());
    }
}
