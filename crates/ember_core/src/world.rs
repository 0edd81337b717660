//! # World
//!
//! One simulation scope: live entities, their components and the systems
//! scoped to the scene.
//!
//! A world is created inactive. While inactive, new instances do not get a
//! mirror until first accessed and systems receive no enable notification.
//! [`World::set_active`] is what the engine calls when a world joins or
//! leaves the running simulation.
//!
//! Entity allocation goes through the world's [`ScopeView`], which scripts
//! reach by world ID through the engine's directory.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bridge::Bridge;
use crate::component::Component;
use crate::directory::ScopeView;
use crate::id::{EntityId, WorldId};
use crate::mirror::{BindContext, BindReport};
use crate::registry::TypeRegistry;
use crate::script::{Hook, HookArgs};
use crate::store::ComponentStore;
use crate::system::{FrameContext, PassReport, System, SystemRegistry};
use crate::type_id::TypeHash;

/// A simulation scope.
pub struct World {
    id: WorldId,
    name: String,
    view: Arc<ScopeView>,
    store: ComponentStore,
    systems: SystemRegistry,
    bridge: Arc<Bridge>,
    active: bool,
}

impl World {
    /// Creates an empty, inactive world.
    #[must_use]
    pub fn new(id: WorldId, name: impl Into<String>, bridge: Arc<Bridge>) -> Self {
        let view = Arc::new(ScopeView::new());
        Self {
            id,
            name: name.into(),
            store: ComponentStore::with_view(Arc::clone(&view)),
            systems: SystemRegistry::with_view(Arc::clone(&view)),
            view,
            bridge,
            active: false,
        }
    }

    /// World ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> WorldId {
        self.id
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` while attached to the running simulation.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Shared entity and presence view.
    #[must_use]
    pub fn view(&self) -> &Arc<ScopeView> {
        &self.view
    }

    /// The bridge this world binds against.
    #[must_use]
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Attaches the world to, or detaches it from, the running simulation.
    ///
    /// Fans enable/disable out to every enabled system. Activation also binds
    /// every component that still lacks a mirror.
    pub fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        let ctx = BindContext::new(&self.bridge, Some(self.id), active);
        self.systems.notify_active(ctx, active);
        if active {
            let report = self.store.bind_missing_mirrors(ctx);
            debug!(world = %self.id, bound = report.bound, "world activated");
        } else {
            debug!(world = %self.id, "world deactivated");
        }
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Allocates a fresh entity.
    pub fn create_entity(&mut self) -> EntityId {
        self.view.alloc_entity()
    }

    /// Destroys an entity and every component attached to it.
    ///
    /// Unknown or already destroyed IDs are ignored; returns whether the
    /// entity was alive.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        if !self.view.free_entity(entity) {
            return false;
        }
        let removed = self.store.remove_entity(&self.bridge, entity);
        debug!(world = %self.id, %entity, components = removed, "entity destroyed");
        true
    }

    /// Checks if `entity` is alive in this world.
    #[must_use]
    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.view.has_entity(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.view.entity_count()
    }

    /// Live entities in slot order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        self.view.entities()
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Adds a default `T` to `entity`, or returns the existing one.
    ///
    /// `None` if `entity` is not alive.
    pub fn add_component<T: Component + Default>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.add_component_with(entity, T::default)
    }

    /// Adds a `T` built by `make` to `entity`, or returns the existing one.
    pub fn add_component_with<T: Component>(
        &mut self,
        entity: EntityId,
        make: impl FnOnce() -> T,
    ) -> Option<&mut T> {
        if !self.view.has_entity(entity) {
            return None;
        }
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        Some(self.store.add_with(ctx, entity, make))
    }

    /// Adds a default instance of the registered component type `hash`.
    pub fn add_component_by_hash(
        &mut self,
        types: &TypeRegistry,
        entity: EntityId,
        hash: TypeHash,
    ) -> bool {
        if !self.view.has_entity(entity) {
            return false;
        }
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        self.store.add_by_hash(types, ctx, hash, entity)
    }

    /// Mutable access to `entity`'s `T`, binding its mirror on first access.
    pub fn get_component<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        self.store.get(ctx, entity)
    }

    /// Read-only access to `entity`'s `T`.
    #[must_use]
    pub fn component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.store.get_ref(entity)
    }

    /// Checks if `entity` has a `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.store.has::<T>(entity)
    }

    /// Removes `entity`'s `T`. Returns `false` if there was none.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> bool {
        self.store.remove::<T>(&self.bridge, entity)
    }

    /// Removes `entity`'s component of type `hash`.
    pub fn remove_component_by_hash(&mut self, entity: EntityId, hash: TypeHash) -> bool {
        self.store.remove_by_hash(&self.bridge, hash, entity)
    }

    /// Every `(entity, &T)`, in storage order.
    pub fn components<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.store.iter::<T>()
    }

    /// Entities having every type in `types`.
    #[must_use]
    pub fn entities_with(&self, types: &[TypeHash]) -> Vec<EntityId> {
        self.store.entities_with(types)
    }

    /// Returns `true` if `entity`'s `T` holds a current mirror.
    #[must_use]
    pub fn mirror_bound<T: Component>(&self, entity: EntityId) -> bool {
        self.store.mirror_bound::<T>(&self.bridge, entity)
    }

    /// The component store.
    #[must_use]
    pub fn store(&self) -> &ComponentStore {
        &self.store
    }

    // =========================================================================
    // Systems
    // =========================================================================

    /// Adds a default `T` to this world's registry, or returns the existing one.
    pub fn add_system<T: System + Default>(&mut self) -> &mut T {
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        self.systems.add(ctx)
    }

    /// Adds a `T` built by `make`, or returns the existing one.
    pub fn add_system_with<T: System>(&mut self, make: impl FnOnce() -> T) -> &mut T {
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        self.systems.add_with(ctx, make)
    }

    /// Adds a default instance of the registered system type `hash`.
    pub fn add_system_by_hash(&mut self, types: &TypeRegistry, hash: TypeHash) -> bool {
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        self.systems.add_by_hash(types, ctx, hash)
    }

    /// Mutable access to `T`, binding its mirror on first access.
    pub fn get_system<T: System>(&mut self) -> Option<&mut T> {
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        self.systems.get(ctx)
    }

    /// Read-only access to `T`.
    #[must_use]
    pub fn system<T: System>(&self) -> Option<&T> {
        self.systems.get_ref()
    }

    /// Removes `T` from this world's registry.
    pub fn remove_system<T: System>(&mut self) -> bool {
        self.systems.remove::<T>(&self.bridge)
    }

    /// Enables or disables `T`. Returns `false` if absent.
    pub fn set_system_enabled<T: System>(&mut self, enabled: bool) -> bool {
        self.set_system_enabled_by_hash(T::INFO.hash, enabled)
    }

    /// Enables or disables the system of type `hash`. Returns `false` if absent.
    pub fn set_system_enabled_by_hash(&mut self, hash: TypeHash, enabled: bool) -> bool {
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        self.systems.set_enabled_by_hash(ctx, hash, enabled)
    }

    /// The system registry.
    #[must_use]
    pub fn systems(&self) -> &SystemRegistry {
        &self.systems
    }

    // =========================================================================
    // Frame passes
    // =========================================================================

    /// Update pass: systems in registration order, then component mirrors.
    pub fn update(&mut self, args: HookArgs) -> PassReport {
        self.pass(Hook::Update, args)
    }

    /// Draw pass: systems in registration order, then component mirrors.
    pub fn draw(&mut self, args: HookArgs) -> PassReport {
        self.pass(Hook::Draw, args)
    }

    fn pass(&mut self, hook: Hook, args: HookArgs) -> PassReport {
        let mut ctx = FrameContext::for_world(self.id, &mut self.store, &self.bridge, args);
        let mut report = match hook {
            Hook::Draw => self.systems.draw(&mut ctx),
            _ => self.systems.update(&mut ctx),
        };
        report += self.store.dispatch(&self.bridge, hook, &args);
        report
    }

    // =========================================================================
    // Reload support
    // =========================================================================

    /// Releases every mirror held by this world. Returns the count.
    pub fn invalidate_mirrors(&mut self) -> usize {
        let systems = self.systems.invalidate_all_mirrors(&self.bridge);
        systems + self.store.invalidate_all_mirrors(&self.bridge)
    }

    /// Binds every instance lacking a current mirror, active or not.
    pub fn bind_missing_mirrors(&mut self) -> BindReport {
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        let mut report = self.systems.bind_missing_mirrors(ctx);
        report.merge(self.store.bind_missing_mirrors(ctx));
        report
    }

    /// Destroys every system, then every component and entity.
    pub fn teardown(&mut self) {
        let ctx = BindContext::new(&self.bridge, Some(self.id), self.active);
        if self.active {
            self.systems.notify_active(ctx, false);
            self.active = false;
        }
        let systems = self.systems.clear(&self.bridge);
        let components = self.store.clear(&self.bridge);
        self.view.clear_entities();
        info!(world = %self.id, name = %self.name, systems, components, "world torn down");
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("entities", &self.view.entity_count())
            .field("components", &self.store.total())
            .field("systems", &self.systems.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Tag(u8);

    impl Component for Tag {
        const TYPE_NAME: &'static str = "Test.Tag";
    }

    fn world() -> World {
        World::new(WorldId::new(1), "test", Arc::new(Bridge::detached()))
    }

    #[test]
    fn test_entity_lifecycle() {
        let mut world = world();
        let e = world.create_entity();
        assert!(world.has_entity(e));
        assert!(world.destroy_entity(e));
        assert!(!world.has_entity(e));
        // Second destroy and unknown IDs are no-ops.
        assert!(!world.destroy_entity(e));
        assert!(!world.destroy_entity(EntityId::new(77, 3)));
    }

    #[test]
    fn test_destroy_clears_components() {
        let mut world = world();
        let e = world.create_entity();
        let keep = world.create_entity();
        world.add_component_with(e, || Tag(1));
        world.add_component_with(keep, || Tag(2));

        world.destroy_entity(e);
        assert!(!world.has_component::<Tag>(e));
        assert_eq!(world.entities_with(&[Tag::INFO.hash]), vec![keep]);
    }

    #[test]
    fn test_dead_entity_gets_no_component() {
        let mut world = world();
        let e = world.create_entity();
        world.destroy_entity(e);
        assert!(world.add_component::<Tag>(e).is_none());

        // A recycled slot does not resurrect the old ID.
        let reused = world.create_entity();
        assert_eq!(reused.index(), e.index());
        assert!(world.add_component::<Tag>(reused).is_some());
        assert!(!world.has_component::<Tag>(e));
    }

    #[test]
    fn test_teardown_empties_world() {
        let mut world = world();
        world.set_active(true);
        let e = world.create_entity();
        world.add_component::<Tag>(e);
        world.teardown();
        assert_eq!(world.entity_count(), 0);
        assert!(world.store().is_empty());
        assert!(!world.is_active());
    }
}
