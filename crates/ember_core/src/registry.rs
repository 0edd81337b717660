//! # Native Type Registry
//!
//! Hash → vtable table for every component and system type the engine knows.
//! Scripts only ever name types by [`TypeHash`]; the vtable is how a hash
//! becomes a constructed native instance without a name lookup per call.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::component::Component;
use crate::error::{EngineError, EngineResult};
use crate::id::EntityId;
use crate::mirror::BindContext;
use crate::store::ComponentStore;
use crate::system::{System, SystemRegistry};
use crate::type_id::{TypeHash, TypeInfo};

/// Monomorphized constructor of a registered type.
#[derive(Clone, Copy)]
pub enum Constructor {
    /// Adds a default instance to an entity (idempotent).
    Component(fn(&mut ComponentStore, BindContext<'_>, EntityId)),
    /// Adds a default instance to a registry (idempotent).
    System(fn(&mut SystemRegistry, BindContext<'_>)),
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component(_) => f.write_str("Constructor::Component"),
            Self::System(_) => f.write_str("Constructor::System"),
        }
    }
}

/// One registered type.
#[derive(Clone, Copy, Debug)]
pub struct TypeVTable {
    /// Static description.
    pub info: TypeInfo,
    /// How to build a default instance.
    pub constructor: Constructor,
}

fn construct_component<T: Component + Default>(
    store: &mut ComponentStore,
    ctx: BindContext<'_>,
    entity: EntityId,
) {
    store.add::<T>(ctx, entity);
}

fn construct_system<T: System + Default>(registry: &mut SystemRegistry, ctx: BindContext<'_>) {
    registry.add::<T>(ctx);
}

/// Process-wide table of native types, keyed by structural hash.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<TypeHash, TypeVTable>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component type. Registering the same type twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::TypeCollision`] if another type already owns `T`'s hash.
    pub fn register_component<T: Component + Default>(&mut self) -> EngineResult<()> {
        self.insert(TypeVTable {
            info: T::INFO,
            constructor: Constructor::Component(construct_component::<T>),
        })
    }

    /// Registers a system type. Registering the same type twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::TypeCollision`] if another type already owns `T`'s hash.
    pub fn register_system<T: System + Default>(&mut self) -> EngineResult<()> {
        self.insert(TypeVTable {
            info: T::INFO,
            constructor: Constructor::System(construct_system::<T>),
        })
    }

    fn insert(&mut self, vtable: TypeVTable) -> EngineResult<()> {
        match self.types.entry(vtable.info.hash) {
            Entry::Occupied(existing) => {
                let existing = existing.get().info;
                if existing.name == vtable.info.name && existing.kind == vtable.info.kind {
                    Ok(())
                } else {
                    Err(EngineError::TypeCollision {
                        hash: vtable.info.hash,
                        existing: existing.name,
                        incoming: vtable.info.name,
                    })
                }
            }
            Entry::Vacant(slot) => {
                debug!(name = vtable.info.name, kind = %vtable.info.kind, "type registered");
                slot.insert(vtable);
                Ok(())
            }
        }
    }

    /// The vtable registered under `hash`.
    #[must_use]
    pub fn get(&self, hash: TypeHash) -> Option<&TypeVTable> {
        self.types.get(&hash)
    }

    /// Static description of the type registered under `hash`.
    #[must_use]
    pub fn info(&self, hash: TypeHash) -> Option<TypeInfo> {
        self.get(hash).map(|vtable| vtable.info)
    }

    /// Constructor of the type registered under `hash`.
    #[must_use]
    pub fn constructor(&self, hash: TypeHash) -> Option<Constructor> {
        self.get(hash).map(|vtable| vtable.constructor)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered types sorted by name.
    #[must_use]
    pub fn infos(&self) -> Vec<TypeInfo> {
        let mut infos: Vec<_> = self.types.values().map(|vtable| vtable.info).collect();
        infos.sort_by_key(|info| info.name);
        infos
    }
}
