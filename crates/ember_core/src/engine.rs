//! # Engine
//!
//! The explicit process-wide context: type registry, bridge, world table,
//! global system registry, script command queue and reload plumbing.
//!
//! ## Frame
//!
//! ```text
//! run_frame(dt)
//!   ├─ poll ReloadSignal            (reload runs here, never inside a pass)
//!   ├─ Update: global systems, then active worlds in ID order
//!   ├─ apply queued script commands
//!   └─ Draw:   global systems, then active worlds in ID order
//! ```
//!
//! ## Shutdown order
//!
//! Worlds (systems, then components), then the global registry, then the
//! bridge. Runs exactly once; `Drop` calls it if the owner did not.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::commands::{CommandQueue, ScriptCommand};
use crate::component::Component;
use crate::directory::WorldDirectory;
use crate::error::{EngineError, EngineResult};
use crate::id::WorldId;
use crate::mirror::BindContext;
use crate::registry::TypeRegistry;
use crate::reload::{ReloadCallback, ReloadReport, ReloadSignal};
use crate::script::{HookArgs, ImageSource, NativeContext, NativeFn, NativeTable, ScriptRuntime};
use crate::system::{FrameContext, PassReport, System, SystemRegistry};
use crate::world::World;

/// What one call to [`Engine::run_frame`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number.
    pub frame: u64,
    /// Update pass outcome.
    pub update: PassReport,
    /// Draw pass outcome.
    pub draw: PassReport,
    /// Wall time of the update pass, command application included.
    pub update_time: Duration,
    /// Wall time of the draw pass.
    pub draw_time: Duration,
    /// Script commands applied between the passes.
    pub commands: usize,
    /// The reload serviced at the start of the frame, if any.
    pub reload: Option<ReloadReport>,
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    runtime: Option<Box<dyn ScriptRuntime>>,
    images: Vec<ImageSource>,
    natives: Vec<(&'static str, usize, NativeFn)>,
    signal: ReloadSignal,
}

impl EngineBuilder {
    /// Sets the scripting runtime.
    #[must_use]
    pub fn runtime(mut self, runtime: impl ScriptRuntime + 'static) -> Self {
        self.runtime = Some(Box::new(runtime));
        self
    }

    /// Appends an image. Images load in the order they were added.
    #[must_use]
    pub fn image(mut self, image: ImageSource) -> Self {
        self.images.push(image);
        self
    }

    /// Appends several images.
    #[must_use]
    pub fn images(mut self, images: impl IntoIterator<Item = ImageSource>) -> Self {
        self.images.extend(images);
        self
    }

    /// Adds a native entry point on top of the standard table.
    #[must_use]
    pub fn native(mut self, name: &'static str, arity: usize, func: NativeFn) -> Self {
        self.natives.push((name, arity, func));
        self
    }

    /// Uses an existing reload signal, e.g. one shared with a file watcher.
    #[must_use]
    pub fn signal(mut self, signal: ReloadSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Starts the scripting layer and builds the engine.
    ///
    /// # Errors
    ///
    /// [`EngineError::FatalInit`] if the runtime cannot start or an image
    /// cannot be loaded.
    pub fn build(self) -> EngineResult<Engine> {
        let commands = CommandQueue::new();
        let directory = WorldDirectory::new();
        let context = NativeContext::new(commands.clone(), self.signal.clone())
            .with_directory(directory.clone());
        let mut natives = NativeTable::standard(context);
        for (name, arity, func) in self.natives {
            natives.register(name, arity, func);
        }

        let bridge = match self.runtime {
            Some(runtime) => Bridge::new(runtime, natives),
            None => Bridge::detached(),
        };
        bridge.start(self.images)?;
        Ok(Engine::with_parts(Arc::new(bridge), commands, self.signal, directory))
    }
}

/// Process-wide engine context.
pub struct Engine {
    pub(crate) bridge: Arc<Bridge>,
    pub(crate) types: TypeRegistry,
    pub(crate) worlds: BTreeMap<WorldId, World>,
    pub(crate) systems: SystemRegistry,
    pub(crate) commands: CommandQueue,
    pub(crate) signal: ReloadSignal,
    directory: WorldDirectory,
    pub(crate) pre_reload: Vec<ReloadCallback>,
    pub(crate) post_reload: Vec<ReloadCallback>,
    next_world: u64,
    frame: u64,
    shut_down: bool,
}

impl Engine {
    /// Starts building an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// An engine without any scripting layer. Nothing ever gets a mirror.
    #[must_use]
    pub fn headless() -> Self {
        Self::with_parts(
            Arc::new(Bridge::detached()),
            CommandQueue::new(),
            ReloadSignal::new(),
            WorldDirectory::new(),
        )
    }

    fn with_parts(
        bridge: Arc<Bridge>,
        commands: CommandQueue,
        signal: ReloadSignal,
        directory: WorldDirectory,
    ) -> Self {
        info!(generation = bridge.generation(), "engine started");
        let systems = SystemRegistry::new();
        directory.insert(None, Arc::clone(systems.view()));
        Self {
            bridge,
            types: TypeRegistry::new(),
            worlds: BTreeMap::new(),
            systems,
            commands,
            signal,
            directory,
            pre_reload: Vec::new(),
            post_reload: Vec::new(),
            next_world: 1,
            frame: 0,
            shut_down: false,
        }
    }

    /// The bridge.
    #[must_use]
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// The native type registry.
    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The reload signal. Clone it to hand it to another thread.
    #[must_use]
    pub fn signal(&self) -> &ReloadSignal {
        &self.signal
    }

    /// World ID → scope view table shared with the native entry points.
    #[must_use]
    pub fn directory(&self) -> &WorldDirectory {
        &self.directory
    }

    /// The script command queue.
    #[must_use]
    pub fn commands(&self) -> &CommandQueue {
        &self.commands
    }

    /// Frames run so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Registers a component type so scripts can add it by hash.
    ///
    /// # Errors
    ///
    /// [`EngineError::TypeCollision`] on a hash collision.
    pub fn register_component<T: Component + Default>(&mut self) -> EngineResult<()> {
        self.types.register_component::<T>()
    }

    /// Registers a system type.
    ///
    /// # Errors
    ///
    /// [`EngineError::TypeCollision`] on a hash collision.
    pub fn register_system<T: System + Default>(&mut self) -> EngineResult<()> {
        self.types.register_system::<T>()
    }

    // =========================================================================
    // World table
    // =========================================================================

    /// Creates a world attached to the running simulation.
    pub fn create_world(&mut self, name: impl Into<String>) -> WorldId {
        let id = WorldId::new(self.next_world);
        self.next_world += 1;

        let mut world = World::new(id, name, Arc::clone(&self.bridge));
        self.directory.insert(Some(id), Arc::clone(world.view()));
        world.set_active(true);
        info!(world = %id, name = world.name(), "world created");
        self.worlds.insert(id, world);
        id
    }

    /// Destroys a world, cascading into its systems and components.
    pub fn destroy_world(&mut self, id: WorldId) -> bool {
        let Some(mut world) = self.worlds.remove(&id) else {
            return false;
        };
        world.teardown();
        self.directory.remove(Some(id));
        true
    }

    /// Looks up a world.
    #[must_use]
    pub fn get_world(&self, id: WorldId) -> Option<&World> {
        self.worlds.get(&id)
    }

    /// Looks up a world mutably.
    pub fn get_world_mut(&mut self, id: WorldId) -> Option<&mut World> {
        self.worlds.get_mut(&id)
    }

    /// Looks up a world, failing with [`EngineError::WorldNotFound`].
    ///
    /// # Errors
    ///
    /// If no world has this ID.
    pub fn world_mut(&mut self, id: WorldId) -> EngineResult<&mut World> {
        self.worlds.get_mut(&id).ok_or(EngineError::WorldNotFound(id))
    }

    /// Every world, in ID order.
    pub fn all_worlds(&self) -> impl Iterator<Item = &World> {
        self.worlds.values()
    }

    /// Every world ID, in order.
    #[must_use]
    pub fn world_ids(&self) -> Vec<WorldId> {
        self.worlds.keys().copied().collect()
    }

    // =========================================================================
    // Global systems
    // =========================================================================

    /// The global system registry.
    #[must_use]
    pub fn global_systems(&self) -> &SystemRegistry {
        &self.systems
    }

    /// Adds a default `T` to the global registry, or returns the existing one.
    pub fn add_global_system<T: System + Default>(&mut self) -> &mut T {
        self.systems.add(BindContext::new(&self.bridge, None, true))
    }

    /// Mutable access to a global system, binding its mirror on first access.
    pub fn global_system<T: System>(&mut self) -> Option<&mut T> {
        self.systems.get(BindContext::new(&self.bridge, None, true))
    }

    /// Removes a global system.
    pub fn remove_global_system<T: System>(&mut self) -> bool {
        self.systems.remove::<T>(&self.bridge)
    }

    /// Enables or disables a global system.
    pub fn set_global_system_enabled<T: System>(&mut self, enabled: bool) -> bool {
        self.systems
            .set_enabled::<T>(BindContext::new(&self.bridge, None, true), enabled)
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Runs one frame.
    pub fn run_frame(&mut self, delta_time: f32) -> FrameReport {
        let reload = self.poll_reload();

        self.frame += 1;
        let args = HookArgs {
            frame: self.frame,
            delta_time,
        };

        let started = Instant::now();
        let mut update = self.systems.update(&mut FrameContext::global(&self.bridge, args));
        for world in self.worlds.values_mut().filter(|w| w.is_active()) {
            update += world.update(args);
        }
        let commands = self.apply_commands();
        let update_time = started.elapsed();

        let started = Instant::now();
        let mut draw = self.systems.draw(&mut FrameContext::global(&self.bridge, args));
        for world in self.worlds.values_mut().filter(|w| w.is_active()) {
            draw += world.draw(args);
        }
        let draw_time = started.elapsed();

        if update.failed + draw.failed > 0 {
            debug!(
                frame = self.frame,
                update = update.failed,
                draw = draw.failed,
                "hooks failed this frame"
            );
        }
        FrameReport {
            frame: self.frame,
            update,
            draw,
            update_time,
            draw_time,
            commands,
            reload,
        }
    }

    /// Applies every queued script command. Returns how many took effect.
    pub fn apply_commands(&mut self) -> usize {
        let mut applied = 0;
        for command in self.commands.drain() {
            match self.apply(&command) {
                Ok(true) => applied += 1,
                Ok(false) => debug!(?command, "script command had no effect"),
                Err(err) => warn!(?command, %err, "script command rejected"),
            }
        }
        applied
    }

    fn apply(&mut self, command: &ScriptCommand) -> EngineResult<bool> {
        match *command {
            ScriptCommand::DestroyEntity { world, entity } => {
                Ok(self.world_mut(world)?.destroy_entity(entity))
            }
            ScriptCommand::AddComponent {
                world,
                entity,
                type_hash,
            } => {
                if self.types.info(type_hash).is_none() {
                    return Err(EngineError::UnknownType(type_hash));
                }
                let target = self.worlds.get_mut(&world).ok_or(EngineError::WorldNotFound(world))?;
                Ok(target.add_component_by_hash(&self.types, entity, type_hash))
            }
            ScriptCommand::RemoveComponent {
                world,
                entity,
                type_hash,
            } => Ok(self.world_mut(world)?.remove_component_by_hash(entity, type_hash)),
            ScriptCommand::SetSystemEnabled {
                world: None,
                type_hash,
                enabled,
            } => Ok(self.systems.set_enabled_by_hash(
                BindContext::new(&self.bridge, None, true),
                type_hash,
                enabled,
            )),
            ScriptCommand::SetSystemEnabled {
                world: Some(world),
                type_hash,
                enabled,
            } => Ok(self.world_mut(world)?.set_system_enabled_by_hash(type_hash, enabled)),
        }
    }

    /// Destroys every world and the global registry, then unloads the bridge.
    ///
    /// Calling it again does nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        for (&id, world) in &mut self.worlds {
            world.teardown();
            self.directory.remove(Some(id));
        }
        self.worlds.clear();
        self.systems.clear(&self.bridge);
        self.directory.remove(None);
        self.bridge.shutdown();
        info!(frames = self.frame, "engine shut down");
    }

    /// Returns `true` once [`Engine::shutdown`] ran.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("bridge", &self.bridge)
            .field("worlds", &self.worlds.len())
            .field("global_systems", &self.systems.len())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::EntityId;
    use crate::type_id::TypeHash;

    #[derive(Default)]
    struct Health(u32);

    impl Component for Health {
        const TYPE_NAME: &'static str = "Test.Health";
    }

    #[test]
    fn test_world_ids_start_at_one_and_never_repeat() {
        let mut engine = Engine::headless();
        let a = engine.create_world("a");
        assert_eq!(a.get(), 1);
        assert!(engine.destroy_world(a));
        let b = engine.create_world("b");
        assert_ne!(a, b);
        assert!(engine.get_world(a).is_none());
        assert!(!engine.destroy_world(a));
        assert_eq!(engine.world_ids(), vec![b]);
    }

    #[test]
    fn test_commands_apply_between_passes() {
        let mut engine = Engine::headless();
        engine.register_component::<Health>().unwrap();
        let w = engine.create_world("main");
        let e = engine.get_world_mut(w).unwrap().create_entity();

        engine.commands().push(ScriptCommand::AddComponent {
            world: w,
            entity: e,
            type_hash: Health::INFO.hash,
        });
        engine.commands().push(ScriptCommand::AddComponent {
            world: w,
            entity: e,
            type_hash: TypeHash::of("Test.Unregistered"),
        });
        engine.commands().push(ScriptCommand::DestroyEntity {
            world: WorldId::new(99),
            entity: EntityId::new(0, 0),
        });

        let report = engine.run_frame(0.016);
        assert_eq!(report.commands, 1);
        assert_eq!(report.frame, 1);
        assert!(engine.get_world(w).unwrap().has_component::<Health>(e));
    }

    #[test]
    fn test_shutdown_runs_once() {
        let mut engine = Engine::headless();
        engine.create_world("main");
        engine.shutdown();
        assert!(engine.is_shut_down());
        assert_eq!(engine.all_worlds().count(), 0);
        engine.shutdown();
    }
}
