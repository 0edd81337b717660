//! # System Registry
//!
//! Singleton-per-type behavior objects. Every world owns one registry and the
//! engine owns one more, the global registry, for systems that outlive any
//! single world.
//!
//! ## Lifecycle
//!
//! ```text
//! add:     construct ─> mirror (if live) ─> init ─> enabled ─> on_enable (if live)
//! remove:  [on_disable: mirror, native] ─> [on_destroy: mirror, native] ─> drop
//! ```
//!
//! Enable/disable notifications are symmetric: a system only receives
//! `on_disable` after it received `on_enable`.

use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::ops::AddAssign;
use std::sync::Arc;

use tracing::{debug, error};

use crate::bridge::{Bridge, HookOutcome};
use crate::directory::ScopeView;
use crate::id::WorldId;
use crate::mirror::{BindContext, BindReport, Mirror, MirrorHandle};
use crate::registry::{Constructor, TypeRegistry};
use crate::script::{Hook, HookArgs};
use crate::store::ComponentStore;
use crate::type_id::{TypeHash, TypeInfo, TypeKind};

/// Error returned by a failing per-frame hook.
pub type SystemError = Box<dyn Error + Send + Sync>;

/// Outcome of one dispatch pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Hooks that ran to completion.
    pub ran: usize,
    /// Hooks that failed. The pass kept going.
    pub failed: usize,
    /// Instances skipped (disabled, or hook not declared).
    pub skipped: usize,
}

impl AddAssign for PassReport {
    fn add_assign(&mut self, rhs: Self) {
        self.ran += rhs.ran;
        self.failed += rhs.failed;
        self.skipped += rhs.skipped;
    }
}

/// What a system sees during `update` and `draw`.
pub struct FrameContext<'a> {
    /// Owning world, `None` for the global registry.
    pub world: Option<WorldId>,
    /// The owning world's components. `None` for the global registry.
    pub store: Option<&'a mut ComponentStore>,
    /// The process-wide bridge.
    pub bridge: &'a Bridge,
    /// Current frame number.
    pub frame: u64,
    /// Time step in seconds.
    pub delta_time: f32,
}

impl<'a> FrameContext<'a> {
    /// Context for the global registry.
    #[must_use]
    pub fn global(bridge: &'a Bridge, args: HookArgs) -> Self {
        Self {
            world: None,
            store: None,
            bridge,
            frame: args.frame,
            delta_time: args.delta_time,
        }
    }

    /// Context for a world's registry.
    #[must_use]
    pub fn for_world(
        world: WorldId,
        store: &'a mut ComponentStore,
        bridge: &'a Bridge,
        args: HookArgs,
    ) -> Self {
        Self {
            world: Some(world),
            store: Some(store),
            bridge,
            frame: args.frame,
            delta_time: args.delta_time,
        }
    }

    /// Hook arguments for this frame.
    #[must_use]
    pub const fn args(&self) -> HookArgs {
        HookArgs {
            frame: self.frame,
            delta_time: self.delta_time,
        }
    }

    /// The world's store together with a binding context for it.
    pub fn store_mut(&mut self) -> Option<(&mut ComponentStore, BindContext<'a>)> {
        let bind = BindContext::new(self.bridge, self.world, true);
        self.store.as_deref_mut().map(|store| (store, bind))
    }
}

/// Marker trait plus lifecycle hooks for systems.
///
/// Every hook has an empty default.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct SceneSystem {
///     frames: u64,
/// }
///
/// impl System for SceneSystem {
///     const TYPE_NAME: &'static str = "Game.SceneSystem";
///
///     fn update(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
///         self.frames += 1;
///         Ok(())
///     }
/// }
/// ```
pub trait System: Any + Send {
    /// Fully-qualified name, `"Namespace.Name"`.
    const TYPE_NAME: &'static str;

    /// Structural identity, derived from `TYPE_NAME`.
    const INFO: TypeInfo = TypeInfo::new(Self::TYPE_NAME, TypeKind::System);

    /// Called once after construction, with the owning world.
    fn init(&mut self, _world: Option<WorldId>) {}

    /// The system became live.
    fn on_enable(&mut self) {}

    /// The system stopped being live.
    fn on_disable(&mut self) {}

    /// Per-frame update.
    ///
    /// # Errors
    ///
    /// A failure is logged and the system is skipped for this frame only.
    fn update(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        Ok(())
    }

    /// Per-frame draw.
    ///
    /// # Errors
    ///
    /// Same contract as [`System::update`].
    fn draw(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        Ok(())
    }

    /// Called once before the system is dropped.
    fn on_destroy(&mut self) {}
}

/// Object-safe face of [`System`].
trait ErasedSystem: Send {
    fn run_init(&mut self, world: Option<WorldId>);
    fn run_enable(&mut self);
    fn run_disable(&mut self);
    fn run_update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError>;
    fn run_draw(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError>;
    fn run_destroy(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: System> ErasedSystem for T {
    fn run_init(&mut self, world: Option<WorldId>) {
        self.init(world);
    }

    fn run_enable(&mut self) {
        self.on_enable();
    }

    fn run_disable(&mut self) {
        self.on_disable();
    }

    fn run_update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        self.update(ctx)
    }

    fn run_draw(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        self.draw(ctx)
    }

    fn run_destroy(&mut self) {
        self.on_destroy();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Entry {
    info: TypeInfo,
    system: Box<dyn ErasedSystem>,
    mirror: Mirror,
    /// User-controlled state.
    enabled: bool,
    /// `on_enable` fired and `on_disable` has not.
    running: bool,
}

impl Entry {
    fn fire(&mut self, bridge: &Bridge, hook: Hook, args: &HookArgs) -> Result<(), ()> {
        let Some(handle) = self.mirror.current(bridge) else {
            return Ok(());
        };
        match bridge.invoke(handle, hook, args) {
            Ok(HookOutcome::Ran | HookOutcome::Skipped | HookOutcome::Stale) => Ok(()),
            Err(err) => {
                error!(system = self.info.name, %hook, %err, "system mirror hook failed");
                Err(())
            }
        }
    }

    fn start(&mut self, bridge: &Bridge) {
        self.system.run_enable();
        let _ = self.fire(bridge, Hook::Enable, &HookArgs::default());
        self.running = true;
    }

    fn stop(&mut self, bridge: &Bridge) {
        let _ = self.fire(bridge, Hook::Disable, &HookArgs::default());
        self.system.run_disable();
        self.running = false;
    }
}

/// Summary of one registered system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemStatus {
    /// Static description.
    pub info: TypeInfo,
    /// User-controlled state.
    pub enabled: bool,
    /// Currently receiving per-frame hooks.
    pub running: bool,
}

/// Per-type singleton registry of systems, in registration order.
#[derive(Default)]
pub struct SystemRegistry {
    entries: Vec<Entry>,
    index: HashMap<TypeHash, usize>,
    view: Arc<ScopeView>,
}

impl SystemRegistry {
    /// Creates an empty registry with a private view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry publishing presence into `view`.
    #[must_use]
    pub fn with_view(view: Arc<ScopeView>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            view,
        }
    }

    /// The presence view this registry keeps up to date.
    #[must_use]
    pub fn view(&self) -> &Arc<ScopeView> {
        &self.view
    }

    fn entry(&self, hash: TypeHash) -> Option<&Entry> {
        self.index.get(&hash).map(|&i| &self.entries[i])
    }

    fn entry_mut(&mut self, hash: TypeHash) -> Option<&mut Entry> {
        self.index.get(&hash).map(|&i| &mut self.entries[i])
    }

    /// Adds a default-constructed `T`, or returns the existing one.
    pub fn add<T: System + Default>(&mut self, ctx: BindContext<'_>) -> &mut T {
        self.add_with(ctx, T::default)
    }

    /// Adds a `T` built by `make`, or returns the existing one.
    ///
    /// A new system gets its mirror (when `ctx.eager`), then `init`, and
    /// starts enabled. It only receives `on_enable` when `ctx.eager` is set;
    /// otherwise that waits for [`SystemRegistry::notify_active`].
    ///
    /// # Panics
    ///
    /// Panics if a different system type already uses `T`'s type hash.
    pub fn add_with<T: System>(
        &mut self,
        ctx: BindContext<'_>,
        make: impl FnOnce() -> T,
    ) -> &mut T {
        let index = match self.index.get(&T::INFO.hash) {
            Some(&index) => index,
            None => {
                let mut entry = Entry {
                    info: T::INFO,
                    system: Box::new(make()),
                    mirror: Mirror::default(),
                    enabled: true,
                    running: false,
                };
                self.view.mark_system(T::INFO.hash, true);
                if ctx.eager {
                    let owner = ctx.owner(None, T::INFO.hash);
                    if let Err(failure) = entry.mirror.ensure(ctx.bridge, &owner) {
                        debug!(system = T::TYPE_NAME, %failure, "system mirror unavailable");
                    }
                }
                entry.system.run_init(ctx.world);
                if ctx.eager {
                    entry.start(ctx.bridge);
                }
                debug!(system = T::TYPE_NAME, world = ?ctx.world, "system added");

                let index = self.entries.len();
                self.entries.push(entry);
                self.index.insert(T::INFO.hash, index);
                index
            }
        };
        downcast_mut(&mut self.entries[index])
    }

    /// Adds a default instance of the registered system type `hash`.
    ///
    /// Returns `false` if `hash` is not a registered system type.
    pub fn add_by_hash(
        &mut self,
        types: &TypeRegistry,
        ctx: BindContext<'_>,
        hash: TypeHash,
    ) -> bool {
        match types.constructor(hash) {
            Some(Constructor::System(construct)) => {
                construct(self, ctx);
                true
            }
            _ => false,
        }
    }

    /// Mutable access to `T`, creating its mirror if it has none.
    pub fn get<T: System>(&mut self, ctx: BindContext<'_>) -> Option<&mut T> {
        let entry = self.entry_mut(T::INFO.hash)?;
        if let Err(failure) = entry.mirror.ensure(ctx.bridge, &ctx.owner(None, T::INFO.hash)) {
            debug!(system = T::TYPE_NAME, %failure, "system mirror unavailable");
        }
        Some(downcast_mut(entry))
    }

    /// Read-only access to `T`. Never touches the mirror.
    #[must_use]
    pub fn get_ref<T: System>(&self) -> Option<&T> {
        self.entry(T::INFO.hash)?.system.as_any().downcast_ref()
    }

    /// Checks if `T` is registered.
    #[must_use]
    pub fn has<T: System>(&self) -> bool {
        self.index.contains_key(&T::INFO.hash)
    }

    /// Checks if a system of type `hash` is registered.
    #[must_use]
    pub fn has_type(&self, hash: TypeHash) -> bool {
        self.index.contains_key(&hash)
    }

    /// Removes `T`, running disable and destroy hooks first.
    pub fn remove<T: System>(&mut self, bridge: &Bridge) -> bool {
        self.remove_by_hash(bridge, T::INFO.hash)
    }

    /// Removes the system of type `hash`. Returns `false` if absent.
    pub fn remove_by_hash(&mut self, bridge: &Bridge, hash: TypeHash) -> bool {
        let Some(index) = self.index.remove(&hash) else {
            return false;
        };
        let mut entry = self.entries.remove(index);
        for (i, e) in self.entries.iter().enumerate().skip(index) {
            self.index.insert(e.info.hash, i);
        }
        retire(&mut entry, bridge);
        self.view.mark_system(hash, false);
        true
    }

    /// Enables or disables `T`. Returns `false` if absent.
    pub fn set_enabled<T: System>(&mut self, ctx: BindContext<'_>, enabled: bool) -> bool {
        self.set_enabled_by_hash(ctx, T::INFO.hash, enabled)
    }

    /// Enables or disables the system of type `hash`. Returns `false` if absent.
    ///
    /// `on_enable` fires only while the registry is live (`ctx.eager`).
    pub fn set_enabled_by_hash(
        &mut self,
        ctx: BindContext<'_>,
        hash: TypeHash,
        enabled: bool,
    ) -> bool {
        let Some(entry) = self.entry_mut(hash) else {
            return false;
        };
        entry.enabled = enabled;
        if enabled && ctx.eager && !entry.running {
            entry.start(ctx.bridge);
        } else if !enabled && entry.running {
            entry.stop(ctx.bridge);
        }
        true
    }

    /// Returns `true` if `T` is registered and enabled.
    #[must_use]
    pub fn is_enabled<T: System>(&self) -> bool {
        self.entry(T::INFO.hash).is_some_and(|e| e.enabled)
    }

    /// Returns `true` if `T` holds a mirror of the current generation.
    #[must_use]
    pub fn mirror_bound<T: System>(&self, bridge: &Bridge) -> bool {
        self.entry(T::INFO.hash).is_some_and(|e| e.mirror.is_bound(bridge))
    }

    /// Raw mirror handle of `T`, possibly stale.
    #[must_use]
    pub fn mirror<T: System>(&self) -> Option<MirrorHandle> {
        self.entry(T::INFO.hash)?.mirror.handle()
    }

    /// Every system in registration order.
    pub fn all(&self) -> impl Iterator<Item = SystemStatus> + '_ {
        self.entries.iter().map(|e| SystemStatus {
            info: e.info,
            enabled: e.enabled,
            running: e.running,
        })
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs `update` on every enabled system, in registration order.
    pub fn update(&mut self, ctx: &mut FrameContext<'_>) -> PassReport {
        self.dispatch(ctx, Hook::Update)
    }

    /// Runs `draw` on every enabled system, in registration order.
    pub fn draw(&mut self, ctx: &mut FrameContext<'_>) -> PassReport {
        self.dispatch(ctx, Hook::Draw)
    }

    fn dispatch(&mut self, ctx: &mut FrameContext<'_>, hook: Hook) -> PassReport {
        let mut report = PassReport::default();
        let args = ctx.args();
        for entry in &mut self.entries {
            if !entry.enabled {
                report.skipped += 1;
                continue;
            }
            let native = match hook {
                Hook::Draw => entry.system.run_draw(ctx),
                _ => entry.system.run_update(ctx),
            };
            if let Err(err) = native {
                error!(system = entry.info.name, %hook, %err, "system hook failed");
                report.failed += 1;
                continue;
            }
            match entry.fire(ctx.bridge, hook, &args) {
                Ok(()) => report.ran += 1,
                Err(()) => report.failed += 1,
            }
        }
        report
    }

    /// Fans an activation change out to every enabled system.
    ///
    /// Activation also binds systems that still lack a mirror.
    pub fn notify_active(&mut self, ctx: BindContext<'_>, active: bool) {
        if active {
            self.bind_missing_mirrors(ctx);
        }
        for entry in self.entries.iter_mut().filter(|e| e.enabled) {
            if active && !entry.running {
                entry.start(ctx.bridge);
            } else if !active && entry.running {
                entry.stop(ctx.bridge);
            }
        }
    }

    /// Releases every mirror without running any hook. Returns the count.
    pub fn invalidate_all_mirrors(&mut self, bridge: &Bridge) -> usize {
        self.entries
            .iter_mut()
            .map(|e| e.mirror.release(bridge, false))
            .filter(|&released| released)
            .count()
    }

    /// Creates a mirror for every system lacking a current one.
    ///
    /// A freshly bound mirror of a running system receives `on_enable`.
    pub fn bind_missing_mirrors(&mut self, ctx: BindContext<'_>) -> BindReport {
        let mut report = BindReport::default();
        for entry in &mut self.entries {
            if entry.mirror.current(ctx.bridge).is_some() {
                continue;
            }
            let result = entry.mirror.ensure(ctx.bridge, &ctx.owner(None, entry.info.hash));
            report.record(entry.info.hash, &result);
            if result.is_ok() && entry.running {
                let _ = entry.fire(ctx.bridge, Hook::Enable, &HookArgs::default());
            }
        }
        report
    }

    /// Releases every mirror and binds a fresh one.
    pub fn recreate_all_mirrors(&mut self, ctx: BindContext<'_>) -> (usize, BindReport) {
        let released = self.invalidate_all_mirrors(ctx.bridge);
        (released, self.bind_missing_mirrors(ctx))
    }

    /// Removes every system, newest first. Returns how many were removed.
    pub fn clear(&mut self, bridge: &Bridge) -> usize {
        let count = self.entries.len();
        while let Some(mut entry) = self.entries.pop() {
            retire(&mut entry, bridge);
        }
        self.index.clear();
        self.view.clear_systems();
        count
    }
}

fn retire(entry: &mut Entry, bridge: &Bridge) {
    if entry.running {
        entry.stop(bridge);
    }
    entry.mirror.release(bridge, true);
    entry.system.run_destroy();
    debug!(system = entry.info.name, "system removed");
}

fn downcast_mut<T: System>(entry: &mut Entry) -> &mut T {
    entry
        .system
        .as_any_mut()
        .downcast_mut()
        .unwrap_or_else(|| panic!("type hash collision on system `{}`", T::TYPE_NAME))
}
