//! # Type-Identity Bridge
//!
//! Process-wide mapping from structural type hashes to the type handles of
//! the currently loaded scripting image(s).
//!
//! ## State machine
//!
//! ```text
//! Unloaded ──start──> Loaded(1) ──begin_reload──> Reloading ──finish_reload──> Loaded(2) ...
//!     ^                                                                            │
//!     └─────────────────────────────────shutdown──────────────────────────────────┘
//! ```
//!
//! The bridge is the only owner of the scripting runtime. Stores and
//! registries reach it through a shared reference and never hold a runtime
//! type handle themselves; they keep generation-tagged [`MirrorHandle`]s.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{BindingFailure, EngineError, EngineResult, ScriptError};
use crate::mirror::MirrorHandle;
use crate::script::{
    Hook, HookArgs, HookSet, ImageSource, MirrorOwner, NativeTable, ScriptRuntime, ScriptTypeId,
    WatchList,
};
use crate::type_id::{TypeHash, TypeKind};

/// Lifecycle state of the scripting layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    /// No image loaded. Mirrors cannot be created.
    Unloaded,
    /// Images loaded and the type table is valid.
    Loaded,
    /// Transient: the old generation is gone, the new one is not built yet.
    Reloading,
}

/// Result of invoking a hook through the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookOutcome {
    /// The hook ran.
    Ran,
    /// The script type does not implement the hook.
    Skipped,
    /// The handle belongs to a previous generation.
    Stale,
}

/// An image that failed to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageError {
    /// Image name.
    pub image: String,
    /// What went wrong.
    pub error: ScriptError,
}

/// Snapshot of the bridge counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeStats {
    /// Current state.
    pub state: BridgeState,
    /// Current generation (0 before the first load).
    pub generation: u64,
    /// Number of structural hashes with a script counterpart.
    pub bound_types: usize,
    /// Mirrors created in this generation and not yet released.
    pub live_mirrors: usize,
    /// Completed reloads.
    pub reloads: u64,
}

#[derive(Clone, Copy, Debug)]
struct BoundType {
    script_type: ScriptTypeId,
    kind: TypeKind,
    hooks: HookSet,
}

struct Inner {
    runtime: Option<Box<dyn ScriptRuntime>>,
    state: BridgeState,
    generation: u64,
    images: Vec<ImageSource>,
    sources: Vec<Vec<PathBuf>>,
    digests: Vec<Option<u64>>,
    watch: WatchList,
    natives: NativeTable,
    table: HashMap<TypeHash, BoundType>,
    live_mirrors: usize,
    reloads: u64,
}

impl Inner {
    fn is_current(&self, handle: MirrorHandle) -> bool {
        self.state == BridgeState::Loaded && handle.generation == self.generation
    }

    /// Loads every image in registration order into a new generation.
    fn load_generation(&mut self) -> Vec<ImageError> {
        self.generation += 1;
        self.table.clear();

        let mut errors = Vec::new();
        let Some(runtime) = self.runtime.as_mut() else {
            self.state = BridgeState::Unloaded;
            return errors;
        };

        self.sources.resize_with(self.images.len(), Vec::new);
        for (image, sources) in self.images.iter().zip(self.sources.iter_mut()) {
            match runtime.load_image(image, &self.natives) {
                Ok(loaded) => {
                    *sources = loaded.sources;
                    for declared in loaded.types {
                        let hash = declared.hash();
                        match self.table.entry(hash) {
                            Entry::Occupied(_) => warn!(
                                image = %image.name,
                                "type `{}` declared twice, keeping the first declaration",
                                declared.qualified_name
                            ),
                            Entry::Vacant(slot) => {
                                slot.insert(BoundType {
                                    script_type: declared.script_type,
                                    kind: declared.kind,
                                    hooks: declared.hooks,
                                });
                            }
                        }
                    }
                }
                Err(error) => {
                    warn!(image = %image.name, %error, "image failed to load");
                    errors.push(ImageError {
                        image: image.name.clone(),
                        error,
                    });
                }
            }
        }

        // A failed image keeps the sources of its last good load.
        self.digests = self
            .images
            .iter()
            .zip(&self.sources)
            .map(|(image, sources)| image.digest_with(sources))
            .collect();
        self.publish_watch_list();
        self.state = BridgeState::Loaded;
        info!(
            generation = self.generation,
            types = self.table.len(),
            "scripting generation loaded"
        );
        errors
    }

    fn publish_watch_list(&self) {
        let paths = self
            .images
            .iter()
            .filter_map(|image| image.path().map(PathBuf::from))
            .chain(self.sources.iter().flatten().cloned())
            .collect();
        self.watch.replace(paths);
    }

    fn unload(&mut self) {
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.unload();
        }
        self.table.clear();
        if self.live_mirrors != 0 {
            warn!(
                leaked = self.live_mirrors,
                "mirrors still live while tearing down the scripting domain"
            );
        }
        self.live_mirrors = 0;
    }
}

/// The process-wide type-identity bridge.
///
/// Shared by every world and registry of an engine. All methods take `&self`;
/// the runtime sits behind a lock so a `Bridge` can be handed around as
/// `Arc<Bridge>`.
pub struct Bridge {
    inner: Mutex<Inner>,
}

impl Bridge {
    /// Creates an unloaded bridge driving `runtime`.
    #[must_use]
    pub fn new(runtime: Box<dyn ScriptRuntime>, natives: NativeTable) -> Self {
        Self::with_runtime(Some(runtime), natives)
    }

    /// Creates a bridge with no scripting layer at all. It stays `Unloaded`
    /// and every binding attempt reports [`BindingFailure::NotLoaded`].
    #[must_use]
    pub fn detached() -> Self {
        Self::with_runtime(None, NativeTable::default())
    }

    fn with_runtime(runtime: Option<Box<dyn ScriptRuntime>>, natives: NativeTable) -> Self {
        Self {
            inner: Mutex::new(Inner {
                runtime,
                state: BridgeState::Unloaded,
                generation: 0,
                images: Vec::new(),
                sources: Vec::new(),
                digests: Vec::new(),
                watch: WatchList::new(),
                natives,
                table: HashMap::new(),
                live_mirrors: 0,
                reloads: 0,
            }),
        }
    }

    /// Starts the runtime and loads the first generation.
    ///
    /// # Errors
    ///
    /// [`EngineError::FatalInit`] if the runtime cannot start or any image
    /// cannot be loaded. The bridge is left `Unloaded`.
    pub fn start(&self, images: Vec<ImageSource>) -> EngineResult<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.images = images;
        inner.sources.clear();

        let Some(runtime) = inner.runtime.as_mut() else {
            return if inner.images.is_empty() {
                Ok(())
            } else {
                Err(EngineError::FatalInit(ScriptError::NotStarted))
            };
        };
        info!(runtime = runtime.name(), "starting scripting runtime");
        runtime.start().map_err(EngineError::FatalInit)?;

        let errors = inner.load_generation();
        if let Some(first) = errors.into_iter().next() {
            inner.unload();
            inner.state = BridgeState::Unloaded;
            return Err(EngineError::FatalInit(first.error));
        }
        Ok(())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BridgeState {
        self.inner.lock().state
    }

    /// Returns `true` while a generation is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state() == BridgeState::Loaded
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Returns `true` if `handle` was created under the current generation.
    #[must_use]
    pub fn is_current(&self, handle: MirrorHandle) -> bool {
        self.inner.lock().is_current(handle)
    }

    /// Returns `true` if the loaded images declare a type for `hash`.
    #[must_use]
    pub fn is_bound(&self, hash: TypeHash) -> bool {
        self.inner.lock().table.contains_key(&hash)
    }

    /// Kind and hooks of the script type bound to `hash`.
    #[must_use]
    pub fn binding(&self, hash: TypeHash) -> Option<(TypeKind, HookSet)> {
        self.inner.lock().table.get(&hash).map(|b| (b.kind, b.hooks))
    }

    /// Creates a mirror object for `owner` and runs its init hook.
    ///
    /// # Errors
    ///
    /// A [`BindingFailure`] if nothing is loaded, the type has no script
    /// counterpart of the owner's kind, or the runtime refused the object.
    pub fn create_mirror(&self, owner: &MirrorOwner) -> Result<MirrorHandle, BindingFailure> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.state != BridgeState::Loaded {
            return Err(BindingFailure::NotLoaded);
        }
        let Some(bound) = inner.table.get(&owner.type_hash).copied() else {
            return Err(BindingFailure::Unbound(owner.type_hash));
        };
        if bound.kind != owner.kind() {
            return Err(BindingFailure::KindMismatch {
                type_hash: owner.type_hash,
                native: owner.kind(),
                declared: bound.kind,
            });
        }
        let Some(runtime) = inner.runtime.as_mut() else {
            return Err(BindingFailure::NotLoaded);
        };

        let object = runtime.create_object(bound.script_type, owner)?;
        if bound.hooks.contains(Hook::Init) {
            if let Err(err) = runtime.invoke(object, Hook::Init, &HookArgs::default()) {
                runtime.release_object(object);
                return Err(BindingFailure::Runtime(err));
            }
        }

        inner.live_mirrors += 1;
        debug!(%object, type_hash = %owner.type_hash, "mirror created");
        Ok(MirrorHandle {
            object,
            type_hash: owner.type_hash,
            generation: inner.generation,
        })
    }

    /// Releases a mirror object. Stale handles are ignored.
    pub fn release_mirror(&self, handle: MirrorHandle, fire_destroy: bool) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.is_current(handle) {
            return false;
        }
        let hooks = inner
            .table
            .get(&handle.type_hash)
            .map_or(HookSet::EMPTY, |b| b.hooks);
        let Some(runtime) = inner.runtime.as_mut() else {
            return false;
        };

        if fire_destroy && hooks.contains(Hook::Destroy) {
            if let Err(err) = runtime.invoke(handle.object, Hook::Destroy, &HookArgs::default()) {
                error!(object = %handle.object, %err, "destroy hook failed");
            }
        }
        let released = runtime.release_object(handle.object);
        if released {
            inner.live_mirrors = inner.live_mirrors.saturating_sub(1);
        }
        released
    }

    /// Runs `hook` on the mirror behind `handle`.
    ///
    /// # Errors
    ///
    /// The script's error if the hook raised one.
    pub fn invoke(
        &self,
        handle: MirrorHandle,
        hook: Hook,
        args: &HookArgs,
    ) -> Result<HookOutcome, ScriptError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.is_current(handle) {
            return Ok(HookOutcome::Stale);
        }
        let declared = inner
            .table
            .get(&handle.type_hash)
            .is_some_and(|b| b.hooks.contains(hook));
        if !declared {
            return Ok(HookOutcome::Skipped);
        }
        let Some(runtime) = inner.runtime.as_mut() else {
            return Ok(HookOutcome::Stale);
        };
        runtime
            .invoke(handle.object, hook, args)
            .map(|()| HookOutcome::Ran)
    }

    /// Step 3 of a reload: tear down the domain and discard the type table.
    pub(crate) fn begin_reload(&self) {
        let mut inner = self.inner.lock();
        inner.state = BridgeState::Reloading;
        inner.unload();
        inner.reloads += 1;
    }

    /// Step 4 of a reload: load every image again, in the original order.
    pub(crate) fn finish_reload(&self) -> Vec<ImageError> {
        self.inner.lock().load_generation()
    }

    /// Tears the scripting layer down for good.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BridgeState::Unloaded {
            inner.unload();
            inner.state = BridgeState::Unloaded;
            info!("scripting layer unloaded");
        }
    }

    /// Returns `true` if any image, or any file an image was built from,
    /// differs from what was loaded.
    #[must_use]
    pub fn images_changed(&self) -> bool {
        let inner = self.inner.lock();
        inner
            .images
            .iter()
            .zip(&inner.sources)
            .map(|(image, sources)| image.digest_with(sources))
            .ne(inner.digests.iter().copied())
    }

    /// Files the loaded generation was built from: every file-backed image
    /// followed by the external sources its types read.
    #[must_use]
    pub fn sources(&self) -> Vec<PathBuf> {
        self.inner.lock().watch.paths()
    }

    /// Shared handle on [`Bridge::sources`], republished after every load.
    #[must_use]
    pub fn watch_list(&self) -> WatchList {
        self.inner.lock().watch.clone()
    }

    /// The registered images, in load order.
    #[must_use]
    pub fn images(&self) -> Vec<ImageSource> {
        self.inner.lock().images.clone()
    }

    /// Number of objects live in the runtime's heap.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.inner
            .lock()
            .runtime
            .as_ref()
            .map_or(0, |runtime| runtime.live_objects())
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        let inner = self.inner.lock();
        BridgeStats {
            state: inner.state,
            generation: inner.generation,
            bound_types: inner.table.len(),
            live_mirrors: inner.live_mirrors,
            reloads: inner.reloads,
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").field("stats", &self.stats()).finish()
    }
}
