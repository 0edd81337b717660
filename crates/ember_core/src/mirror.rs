//! # Mirror References
//!
//! A mirror is the scripting-side counterpart of a native component or
//! system. The native side only ever holds a [`MirrorHandle`]: an object ID
//! tagged with the bridge generation it was created under. A handle from an
//! older generation reads as absent and is nulled out the moment it is
//! observed.

use std::collections::BTreeSet;

use crate::bridge::Bridge;
use crate::error::BindingFailure;
use crate::id::{EntityId, ObjectId, WorldId};
use crate::script::MirrorOwner;
use crate::type_id::TypeHash;

/// Generation-tagged, non-owning link to a scripting object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MirrorHandle {
    pub(crate) object: ObjectId,
    pub(crate) type_hash: TypeHash,
    pub(crate) generation: u64,
}

impl MirrorHandle {
    /// The scripting object.
    #[must_use]
    pub const fn object(&self) -> ObjectId {
        self.object
    }

    /// Structural identity of the native owner's type.
    #[must_use]
    pub const fn type_hash(&self) -> TypeHash {
        self.type_hash
    }

    /// Bridge generation this handle belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// The mirror slot carried by every native component and system instance.
///
/// A native instance's lifetime never depends on its mirror.
#[derive(Debug, Default)]
pub struct Mirror {
    handle: Option<MirrorHandle>,
}

impl Mirror {
    /// The raw handle, which may be stale.
    #[must_use]
    pub const fn handle(&self) -> Option<MirrorHandle> {
        self.handle
    }

    /// Returns `true` if the slot holds a handle of the current generation.
    #[must_use]
    pub fn is_bound(&self, bridge: &Bridge) -> bool {
        self.handle.is_some_and(|h| bridge.is_current(h))
    }

    /// Returns the handle if it is current, nulling it out if it is stale.
    pub fn current(&mut self, bridge: &Bridge) -> Option<MirrorHandle> {
        match self.handle {
            Some(handle) if bridge.is_current(handle) => Some(handle),
            Some(_) => {
                self.handle = None;
                None
            }
            None => None,
        }
    }

    /// Returns the current handle, creating a mirror if the slot is empty.
    ///
    /// # Errors
    ///
    /// The [`BindingFailure`] of the creation attempt; the slot stays empty.
    pub fn ensure(
        &mut self,
        bridge: &Bridge,
        owner: &MirrorOwner,
    ) -> Result<MirrorHandle, BindingFailure> {
        if let Some(handle) = self.current(bridge) {
            return Ok(handle);
        }
        let handle = bridge.create_mirror(owner)?;
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Empties the slot and releases the scripting object.
    ///
    /// `fire_destroy` runs the script's destroy hook first; reload sweeps pass
    /// `false` because the native owner lives on.
    pub fn release(&mut self, bridge: &Bridge, fire_destroy: bool) -> bool {
        self.handle
            .take()
            .is_some_and(|handle| bridge.release_mirror(handle, fire_destroy))
    }
}

/// Everything a store needs to create mirrors for the instances it owns.
#[derive(Clone, Copy)]
pub struct BindContext<'a> {
    /// The process-wide bridge.
    pub bridge: &'a Bridge,
    /// Owning world, `None` for the global registry.
    pub world: Option<WorldId>,
    /// Create mirrors eagerly on add. `false` while the owner is inactive.
    pub eager: bool,
}

impl<'a> BindContext<'a> {
    /// Creates a context.
    #[must_use]
    pub const fn new(bridge: &'a Bridge, world: Option<WorldId>, eager: bool) -> Self {
        Self {
            bridge,
            world,
            eager,
        }
    }

    /// Owner descriptor for an instance of `type_hash`.
    #[must_use]
    pub const fn owner(&self, entity: Option<EntityId>, type_hash: TypeHash) -> MirrorOwner {
        MirrorOwner {
            world: self.world,
            entity,
            type_hash,
        }
    }
}

/// Outcome of a bulk binding pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindReport {
    /// Instances that got a mirror.
    pub bound: usize,
    /// Instances left mirror-less.
    pub failed: usize,
    /// Types that had no script counterpart (or whose creation failed).
    pub unbound: BTreeSet<TypeHash>,
}

impl BindReport {
    /// Records one binding attempt.
    pub fn record<T>(&mut self, hash: TypeHash, result: &Result<T, BindingFailure>) {
        match result {
            Ok(_) => self.bound += 1,
            Err(BindingFailure::NotLoaded) => self.failed += 1,
            Err(_) => {
                self.failed += 1;
                self.unbound.insert(hash);
            }
        }
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.bound += other.bound;
        self.failed += other.failed;
        self.unbound.extend(other.unbound);
    }
}
