//! # Component Store
//!
//! Type-indexed storage for every component of one world.
//!
//! Each component type gets its own sparse set:
//!
//! ```text
//! sparse:   {e7 -> 0, e2 -> 1, e9 -> 2}      EntityId -> dense index
//! entities: [e7, e2, e9]
//! dense:    [C(e7), C(e2), C(e9)]            value + mirror slot
//! ```
//!
//! - Add / lookup / remove: O(1)
//! - Removal swaps the last element into the hole, so a dense index taken
//!   before a removal may point at a different entity afterwards. IDs stay valid.
//! - Iteration is over contiguous memory in dense order.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, error};

use crate::bridge::{Bridge, HookOutcome};
use crate::component::Component;
use crate::directory::ScopeView;
use crate::error::BindingFailure;
use crate::id::EntityId;
use crate::mirror::{BindContext, BindReport, Mirror, MirrorHandle};
use crate::registry::{Constructor, TypeRegistry};
use crate::script::{Hook, HookArgs};
use crate::system::PassReport;
use crate::type_id::{TypeHash, TypeInfo};

struct Slot<T> {
    value: T,
    mirror: Mirror,
}

/// Sparse set holding every instance of one component type.
struct Pool<T> {
    dense: Vec<Slot<T>>,
    entities: Vec<EntityId>,
    sparse: HashMap<EntityId, usize>,
}

impl<T: Component> Pool<T> {
    fn new() -> Self {
        Self {
            dense: Vec::new(),
            entities: Vec::new(),
            sparse: HashMap::new(),
        }
    }
}

/// Type-erased view of a pool, used for every operation that is driven by a
/// type hash rather than a Rust type.
trait ErasedPool: Send {
    fn info(&self) -> TypeInfo;
    fn len(&self) -> usize;
    fn contains(&self, entity: EntityId) -> bool;
    fn entities(&self) -> &[EntityId];
    fn mirror(&self, entity: EntityId) -> Option<MirrorHandle>;
    fn remove(&mut self, bridge: &Bridge, entity: EntityId) -> bool;
    fn invalidate_mirrors(&mut self, bridge: &Bridge) -> usize;
    fn bind_missing(&mut self, ctx: BindContext<'_>) -> BindReport;
    fn dispatch(&mut self, bridge: &Bridge, hook: Hook, args: &HookArgs) -> PassReport;
    fn clear(&mut self, bridge: &Bridge) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedPool for Pool<T> {
    fn info(&self) -> TypeInfo {
        T::INFO
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.sparse.contains_key(&entity)
    }

    fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    fn mirror(&self, entity: EntityId) -> Option<MirrorHandle> {
        let index = *self.sparse.get(&entity)?;
        self.dense[index].mirror.handle()
    }

    fn remove(&mut self, bridge: &Bridge, entity: EntityId) -> bool {
        let Some(index) = self.sparse.remove(&entity) else {
            return false;
        };

        let mut slot = self.dense.swap_remove(index);
        self.entities.swap_remove(index);
        if let Some(&moved) = self.entities.get(index) {
            self.sparse.insert(moved, index);
        }

        // Mirror goes first; the native value is dropped on return.
        slot.mirror.release(bridge, true);
        true
    }

    fn invalidate_mirrors(&mut self, bridge: &Bridge) -> usize {
        self.dense
            .iter_mut()
            .map(|slot| slot.mirror.release(bridge, false))
            .filter(|&released| released)
            .count()
    }

    fn bind_missing(&mut self, ctx: BindContext<'_>) -> BindReport {
        let mut report = BindReport::default();
        for (slot, &entity) in self.dense.iter_mut().zip(&self.entities) {
            if slot.mirror.current(ctx.bridge).is_some() {
                continue;
            }
            let owner = ctx.owner(Some(entity), T::INFO.hash);
            report.record(T::INFO.hash, &slot.mirror.ensure(ctx.bridge, &owner));
        }
        report
    }

    fn dispatch(&mut self, bridge: &Bridge, hook: Hook, args: &HookArgs) -> PassReport {
        let mut report = PassReport::default();
        for (slot, entity) in self.dense.iter_mut().zip(&self.entities) {
            let Some(handle) = slot.mirror.current(bridge) else {
                continue;
            };
            match bridge.invoke(handle, hook, args) {
                Ok(HookOutcome::Ran) => report.ran += 1,
                Ok(HookOutcome::Skipped | HookOutcome::Stale) => report.skipped += 1,
                Err(err) => {
                    error!(component = T::TYPE_NAME, %entity, %hook, %err, "component hook failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn clear(&mut self, bridge: &Bridge) -> usize {
        let count = self.dense.len();
        for mut slot in self.dense.drain(..) {
            slot.mirror.release(bridge, true);
        }
        self.entities.clear();
        self.sparse.clear();
        count
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Per-world component storage.
///
/// Pools are kept in a `BTreeMap` so every type-erased pass (entity
/// destruction, reload sweeps, hook dispatch) visits types in the same order.
/// Every add and removal is mirrored into the store's [`ScopeView`].
#[derive(Default)]
pub struct ComponentStore {
    pools: BTreeMap<TypeHash, Box<dyn ErasedPool>>,
    view: Arc<ScopeView>,
}

impl ComponentStore {
    /// Creates an empty store with a private view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store publishing presence into `view`.
    #[must_use]
    pub fn with_view(view: Arc<ScopeView>) -> Self {
        Self {
            pools: BTreeMap::new(),
            view,
        }
    }

    /// The presence view this store keeps up to date.
    #[must_use]
    pub fn view(&self) -> &Arc<ScopeView> {
        &self.view
    }

    fn pool<T: Component>(&self) -> Option<&Pool<T>> {
        self.pools
            .get(&T::INFO.hash)
            .and_then(|pool| pool.as_any().downcast_ref())
    }

    fn pool_mut<T: Component>(&mut self) -> Option<&mut Pool<T>> {
        self.pools
            .get_mut(&T::INFO.hash)
            .and_then(|pool| pool.as_any_mut().downcast_mut())
    }

    fn pool_or_insert<T: Component>(
        pools: &mut BTreeMap<TypeHash, Box<dyn ErasedPool>>,
    ) -> &mut Pool<T> {
        pools
            .entry(T::INFO.hash)
            .or_insert_with(|| Box::new(Pool::<T>::new()))
            .as_any_mut()
            .downcast_mut()
            .unwrap_or_else(|| panic!("type hash collision on component `{}`", T::TYPE_NAME))
    }

    /// Adds a default-constructed `T` to `entity`, or returns the existing one.
    ///
    /// See [`ComponentStore::add_with`].
    pub fn add<T: Component + Default>(
        &mut self,
        ctx: BindContext<'_>,
        entity: EntityId,
    ) -> &mut T {
        self.add_with(ctx, entity, T::default)
    }

    /// Adds a `T` built by `make` to `entity`, or returns the existing one.
    ///
    /// Idempotent: if `entity` already has a `T`, `make` is not called and the
    /// existing instance is returned untouched. A new instance gets its mirror
    /// immediately when `ctx.eager` is set and the scripting layer is loaded;
    /// otherwise the mirror is created on first [`ComponentStore::get`].
    ///
    /// The caller is responsible for `entity` being alive.
    ///
    /// # Panics
    ///
    /// Panics if a different component type already uses `T`'s type hash.
    pub fn add_with<T: Component>(
        &mut self,
        ctx: BindContext<'_>,
        entity: EntityId,
        make: impl FnOnce() -> T,
    ) -> &mut T {
        let pool = Self::pool_or_insert::<T>(&mut self.pools);
        if let Some(&index) = pool.sparse.get(&entity) {
            return &mut pool.dense[index].value;
        }
        // Visible to the new instance's own init hook.
        self.view.mark_component(entity, T::INFO.hash, true);

        let mut slot = Slot {
            value: make(),
            mirror: Mirror::default(),
        };
        if ctx.eager {
            let owner = ctx.owner(Some(entity), T::INFO.hash);
            if let Err(failure) = slot.mirror.ensure(ctx.bridge, &owner) {
                log_binding_failure(T::TYPE_NAME, entity, &failure);
            }
        }

        let index = pool.dense.len();
        pool.dense.push(slot);
        pool.entities.push(entity);
        pool.sparse.insert(entity, index);
        &mut pool.dense[index].value
    }

    /// Mutable access to `entity`'s `T`, creating its mirror if it has none.
    ///
    /// A failed mirror creation is not an error: the native instance is
    /// returned either way and binding is retried on the next access.
    pub fn get<T: Component>(&mut self, ctx: BindContext<'_>, entity: EntityId) -> Option<&mut T> {
        let pool = self.pool_mut::<T>()?;
        let index = *pool.sparse.get(&entity)?;
        let slot = &mut pool.dense[index];

        let owner = ctx.owner(Some(entity), T::INFO.hash);
        if let Err(failure) = slot.mirror.ensure(ctx.bridge, &owner) {
            log_binding_failure(T::TYPE_NAME, entity, &failure);
        }
        Some(&mut slot.value)
    }

    /// Read-only access to `entity`'s `T`. Never touches the mirror.
    #[must_use]
    pub fn get_ref<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let pool = self.pool::<T>()?;
        let index = *pool.sparse.get(&entity)?;
        Some(&pool.dense[index].value)
    }

    /// Checks if `entity` has a `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.has_type(T::INFO.hash, entity)
    }

    /// Checks if `entity` has a component of type `hash`.
    #[must_use]
    pub fn has_type(&self, hash: TypeHash, entity: EntityId) -> bool {
        self.pools.get(&hash).is_some_and(|pool| pool.contains(entity))
    }

    /// Removes `entity`'s `T`, releasing its mirror before the native value.
    ///
    /// Returns `false` (and changes nothing) if there was none.
    pub fn remove<T: Component>(&mut self, bridge: &Bridge, entity: EntityId) -> bool {
        self.remove_by_hash(bridge, T::INFO.hash, entity)
    }

    /// Adds a default instance of the registered component type `hash`.
    ///
    /// Returns `false` if `hash` is not a registered component type.
    pub fn add_by_hash(
        &mut self,
        types: &TypeRegistry,
        ctx: BindContext<'_>,
        hash: TypeHash,
        entity: EntityId,
    ) -> bool {
        match types.constructor(hash) {
            Some(Constructor::Component(construct)) => {
                construct(self, ctx, entity);
                true
            }
            _ => false,
        }
    }

    /// Removes `entity`'s component of type `hash`.
    pub fn remove_by_hash(&mut self, bridge: &Bridge, hash: TypeHash, entity: EntityId) -> bool {
        let removed = self
            .pools
            .get_mut(&hash)
            .is_some_and(|pool| pool.remove(bridge, entity));
        if removed {
            self.view.mark_component(entity, hash, false);
        }
        removed
    }

    /// Removes every component of `entity`. Returns how many were removed.
    pub fn remove_entity(&mut self, bridge: &Bridge, entity: EntityId) -> usize {
        let mut removed = 0;
        for (&hash, pool) in &mut self.pools {
            if pool.remove(bridge, entity) {
                self.view.mark_component(entity, hash, false);
                removed += 1;
            }
        }
        removed
    }

    /// Returns `true` if `entity`'s `T` holds a mirror of the current generation.
    #[must_use]
    pub fn mirror_bound<T: Component>(&self, bridge: &Bridge, entity: EntityId) -> bool {
        self.mirror::<T>(entity).is_some_and(|h| bridge.is_current(h))
    }

    /// Raw mirror handle of `entity`'s `T`, possibly stale.
    #[must_use]
    pub fn mirror<T: Component>(&self, entity: EntityId) -> Option<MirrorHandle> {
        self.pools.get(&T::INFO.hash)?.mirror(entity)
    }

    /// Entities that have every component type in `types`.
    ///
    /// Walks the smallest pool in dense order and keeps the entities present
    /// in all other pools: O(n_min * k) for k types. The result order is the
    /// smallest pool's dense order, so it is stable for a given store state.
    /// Ties between equally sized pools go to the first one in `types`.
    #[must_use]
    pub fn entities_with(&self, types: &[TypeHash]) -> Vec<EntityId> {
        let mut pools = Vec::with_capacity(types.len());
        for hash in types {
            match self.pools.get(hash) {
                Some(pool) => pools.push(&**pool),
                None => return Vec::new(),
            }
        }

        let Some(smallest) = pools.iter().min_by_key(|pool| pool.len()) else {
            return Vec::new();
        };
        smallest
            .entities()
            .iter()
            .copied()
            .filter(|&entity| pools.iter().all(|pool| pool.contains(entity)))
            .collect()
    }

    /// Iterates over every `(entity, &T)` in dense order.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.pool::<T>().into_iter().flat_map(|pool| {
            pool.entities
                .iter()
                .copied()
                .zip(pool.dense.iter().map(|slot| &slot.value))
        })
    }

    /// Iterates over every `(entity, &mut T)` in dense order.
    pub fn iter_mut<T: Component>(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.pool_mut::<T>().into_iter().flat_map(|pool| {
            let Pool { dense, entities, .. } = pool;
            entities
                .iter()
                .copied()
                .zip(dense.iter_mut().map(|slot| &mut slot.value))
        })
    }

    /// Number of `T` instances.
    #[must_use]
    pub fn len<T: Component>(&self) -> usize {
        self.pools.get(&T::INFO.hash).map_or(0, |pool| pool.len())
    }

    /// Total number of component instances of every type.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pools.values().map(|pool| pool.len()).sum()
    }

    /// Returns `true` if the store holds no component at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Every component type that has ever been stored, in hash order.
    pub fn types(&self) -> impl Iterator<Item = TypeInfo> + '_ {
        self.pools.values().map(|pool| pool.info())
    }

    /// Releases every mirror without touching the native instances.
    /// Returns the number of mirrors released.
    pub fn invalidate_all_mirrors(&mut self, bridge: &Bridge) -> usize {
        self.pools
            .values_mut()
            .map(|pool| pool.invalidate_mirrors(bridge))
            .sum()
    }

    /// Creates a mirror for every instance that lacks a current one.
    ///
    /// Used after a reload (where it recreates every mirror) and when a world
    /// becomes active.
    pub fn bind_missing_mirrors(&mut self, ctx: BindContext<'_>) -> BindReport {
        let mut report = BindReport::default();
        for pool in self.pools.values_mut() {
            report.merge(pool.bind_missing(ctx));
        }
        report
    }

    /// Releases every mirror and binds a fresh one, keeping native values.
    /// Returns the number of mirrors released and the binding outcome.
    pub fn recreate_all_mirrors(&mut self, ctx: BindContext<'_>) -> (usize, BindReport) {
        let released = self.invalidate_all_mirrors(ctx.bridge);
        (released, self.bind_missing_mirrors(ctx))
    }

    /// Runs `hook` on every bound component mirror.
    pub fn dispatch(&mut self, bridge: &Bridge, hook: Hook, args: &HookArgs) -> PassReport {
        let mut report = PassReport::default();
        for pool in self.pools.values_mut() {
            report += pool.dispatch(bridge, hook, args);
        }
        report
    }

    /// Removes every component, releasing mirrors first. Returns how many were removed.
    pub fn clear(&mut self, bridge: &Bridge) -> usize {
        let removed = self.pools.values_mut().map(|pool| pool.clear(bridge)).sum();
        self.view.clear_components();
        removed
    }
}

fn log_binding_failure(type_name: &str, entity: EntityId, failure: &BindingFailure) {
    if !matches!(failure, BindingFailure::NotLoaded) {
        debug!(component = type_name, %entity, %failure, "mirror unavailable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::EntityAllocator;

    #[derive(Debug, Default, PartialEq)]
    struct A(u32);

    impl Component for A {
        const TYPE_NAME: &'static str = "Test.A";
    }

    #[derive(Debug, Default, PartialEq)]
    struct B(u32);

    impl Component for B {
        const TYPE_NAME: &'static str = "Test.B";
    }

    fn detached() -> Bridge {
        Bridge::detached()
    }

    #[test]
    fn test_add_is_idempotent() {
        let bridge = detached();
        let ctx = BindContext::new(&bridge, None, true);
        let mut store = ComponentStore::new();
        let e = EntityId::new(0, 0);

        let first: *const A = store.add_with(ctx, e, || A(5));
        let again: *const A = store.add_with(ctx, e, || A(99));
        assert!(std::ptr::eq(first, again));
        assert_eq!(store.get_ref::<A>(e), Some(&A(5)));
        assert_eq!(store.len::<A>(), 1);
        assert!(store.has::<A>(e));
        assert!(store.view().has_component(e, A::INFO.hash));
    }

    #[test]
    fn test_remove_absent_leaves_store_unchanged() {
        let bridge = detached();
        let ctx = BindContext::new(&bridge, None, true);
        let mut store = ComponentStore::new();
        let e = EntityId::new(0, 0);
        let other = EntityId::new(1, 0);

        store.add_with(ctx, other, || A(1));
        assert!(!store.remove::<A>(&bridge, e));
        assert!(!store.remove::<B>(&bridge, other));
        assert_eq!(store.len::<A>(), 1);
        assert_eq!(store.get_ref::<A>(other), Some(&A(1)));

        assert!(store.remove::<A>(&bridge, other));
        assert!(!store.has::<A>(other));
    }

    #[test]
    fn test_swap_remove_keeps_index_map_consistent() {
        let bridge = detached();
        let ctx = BindContext::new(&bridge, None, true);
        let mut store = ComponentStore::new();
        let mut entities = EntityAllocator::new();
        let ids: Vec<_> = (0..4).map(|_| entities.alloc()).collect();

        for (i, &e) in ids.iter().enumerate() {
            store.add_with(ctx, e, || A(u32::try_from(i).unwrap()));
        }

        // Removing the first slot moves the last entity into it.
        assert!(store.remove::<A>(&bridge, ids[0]));
        assert_eq!(store.get_ref::<A>(ids[3]), Some(&A(3)));
        assert_eq!(store.get_ref::<A>(ids[1]), Some(&A(1)));
        assert_eq!(store.get_ref::<A>(ids[0]), None);

        let order: Vec<_> = store.iter::<A>().map(|(e, _)| e).collect();
        assert_eq!(order, vec![ids[3], ids[1], ids[2]]);
    }

    #[test]
    fn test_entities_with_intersection() {
        let bridge = detached();
        let ctx = BindContext::new(&bridge, None, true);
        let mut store = ComponentStore::new();
        let mut entities = EntityAllocator::new();
        let ids: Vec<_> = (0..5).map(|_| entities.alloc()).collect();

        // Three with A, two with B, exactly one with both.
        store.add::<A>(ctx, ids[0]);
        store.add::<A>(ctx, ids[1]);
        store.add::<A>(ctx, ids[2]);
        store.add::<B>(ctx, ids[2]);
        store.add::<B>(ctx, ids[4]);

        let both = store.entities_with(&[A::INFO.hash, B::INFO.hash]);
        assert_eq!(both, vec![ids[2]]);
        assert_eq!(store.entities_with(&[B::INFO.hash, A::INFO.hash]), both);
        assert_eq!(store.entities_with(&[A::INFO.hash]).len(), 3);
        assert!(store.entities_with(&[]).is_empty());
        assert!(store
            .entities_with(&[A::INFO.hash, TypeHash::of("Test.Missing")])
            .is_empty());
    }

    #[test]
    fn test_remove_entity_clears_every_type() {
        let bridge = detached();
        let ctx = BindContext::new(&bridge, None, true);
        let mut store = ComponentStore::new();
        let e = EntityId::new(3, 1);

        store.add::<A>(ctx, e);
        store.add::<B>(ctx, e);
        assert!(store.view().has_component(e, B::INFO.hash));
        assert_eq!(store.remove_entity(&bridge, e), 2);
        assert!(!store.has::<A>(e));
        assert!(!store.has::<B>(e));
        assert!(!store.view().has_component(e, A::INFO.hash));
        assert!(!store.view().has_component(e, B::INFO.hash));
        assert!(store.is_empty());
        assert_eq!(store.types().count(), 2);
    }

    #[test]
    fn test_detached_bridge_never_binds() {
        let bridge = detached();
        let ctx = BindContext::new(&bridge, None, true);
        let mut store = ComponentStore::new();
        let e = EntityId::new(0, 0);

        store.add::<A>(ctx, e);
        assert!(store.get::<A>(ctx, e).is_some());
        assert!(!store.mirror_bound::<A>(&bridge, e));

        let report = store.bind_missing_mirrors(ctx);
        assert_eq!(report.bound, 0);
        assert_eq!(report.failed, 1);
        assert!(report.unbound.is_empty());
    }

    #[test]
    fn test_iter_mut_edits_in_place() {
        let bridge = detached();
        let ctx = BindContext::new(&bridge, None, true);
        let mut store = ComponentStore::new();
        let e = EntityId::new(0, 0);
        store.add_with(ctx, e, || B(1));

        for (_, b) in store.iter_mut::<B>() {
            b.0 += 10;
        }
        assert_eq!(store.get_ref::<B>(e), Some(&B(11)));
        assert_eq!(store.iter::<A>().count(), 0);
    }
}
