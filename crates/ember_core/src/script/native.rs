//! Native entry points exposed to the scripting layer.
//!
//! The table is handed to the runtime at every image load. Entry points only
//! take and return integers (entity, world and type-hash bits) and never touch
//! a store directly. Mutations enqueue [`ScriptCommand`]s that the engine
//! applies after the current pass; entity creation and presence queries go
//! through the [`WorldDirectory`] and take effect immediately.

use std::fmt;
use std::sync::Arc;

use crate::commands::{CommandQueue, ScriptCommand};
use crate::directory::{ScopeView, WorldDirectory};
use crate::id::{EntityId, WorldId};
use crate::reload::ReloadSignal;
use crate::type_id::TypeHash;

/// Signature of a native entry point.
pub type NativeFn = fn(&NativeContext, &[i64]) -> i64;

/// One named entry point.
#[derive(Clone, Copy)]
pub struct NativeEntry {
    /// Name the script calls.
    pub name: &'static str,
    /// Number of integer arguments.
    pub arity: usize,
    /// The native function.
    pub func: NativeFn,
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEntry")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Shared state every entry point can reach.
#[derive(Clone, Debug, Default)]
pub struct NativeContext {
    commands: CommandQueue,
    signal: ReloadSignal,
    directory: WorldDirectory,
}

impl NativeContext {
    /// Creates a context writing into `commands` and raising `signal`.
    #[must_use]
    pub fn new(commands: CommandQueue, signal: ReloadSignal) -> Self {
        Self {
            commands,
            signal,
            directory: WorldDirectory::new(),
        }
    }

    /// Resolves worlds through `directory`.
    #[must_use]
    pub fn with_directory(mut self, directory: WorldDirectory) -> Self {
        self.directory = directory;
        self
    }

    /// The view of a world (0 = global registry).
    #[must_use]
    pub fn scope(&self, world: i64) -> Option<Arc<ScopeView>> {
        self.directory.get(world_arg(world))
    }

    /// Queues a command for the engine.
    pub fn push(&self, command: ScriptCommand) {
        self.commands.push(command);
    }

    /// The reload signal.
    #[must_use]
    pub fn signal(&self) -> &ReloadSignal {
        &self.signal
    }
}

/// Registration table of native entry points, name → function.
#[derive(Clone, Debug, Default)]
pub struct NativeTable {
    entries: Vec<NativeEntry>,
    context: NativeContext,
}

impl NativeTable {
    /// An empty table.
    #[must_use]
    pub fn new(context: NativeContext) -> Self {
        Self {
            entries: Vec::new(),
            context,
        }
    }

    /// The table every engine starts with.
    ///
    /// | name                 | arguments                           | returns          |
    /// |----------------------|-------------------------------------|------------------|
    /// | `create_entity`      | world                               | entity, or -1    |
    /// | `destroy_entity`     | world, entity                       | 1                |
    /// | `add_component`      | world, entity, type hash            | 1                |
    /// | `remove_component`   | world, entity, type hash            | 1                |
    /// | `set_system_enabled` | world (0 = global), type hash, flag | 1                |
    /// | `has_entity`         | world, entity                       | 0 or 1           |
    /// | `has_component`      | world, entity, type hash            | 0 or 1           |
    /// | `has_system`         | world (0 = global), type hash       | 0 or 1           |
    /// | `request_reload`     |                                     | 1                |
    ///
    /// Queries see commands of the current pass only once they are applied.
    #[must_use]
    pub fn standard(context: NativeContext) -> Self {
        let mut table = Self::new(context);
        table.register("create_entity", 1, create_entity);
        table.register("destroy_entity", 2, destroy_entity);
        table.register("add_component", 3, add_component);
        table.register("remove_component", 3, remove_component);
        table.register("set_system_enabled", 3, set_system_enabled);
        table.register("has_entity", 2, has_entity);
        table.register("has_component", 3, has_component);
        table.register("has_system", 2, has_system);
        table.register("request_reload", 0, request_reload);
        table
    }

    /// Adds or replaces an entry point.
    pub fn register(&mut self, name: &'static str, arity: usize, func: NativeFn) {
        let entry = NativeEntry { name, arity, func };
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Looks up an entry point by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NativeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// All entry points in registration order.
    #[must_use]
    pub fn entries(&self) -> &[NativeEntry] {
        &self.entries
    }

    /// The context passed to every call.
    #[must_use]
    pub fn context(&self) -> &NativeContext {
        &self.context
    }

    /// Calls an entry point by name. Returns `None` on unknown name or arity mismatch.
    #[must_use]
    pub fn call(&self, name: &str, args: &[i64]) -> Option<i64> {
        let entry = self.get(name)?;
        (entry.arity == args.len()).then(|| (entry.func)(&self.context, args))
    }
}

#[allow(clippy::cast_sign_loss)]
const fn bits(value: i64) -> u64 {
    value as u64
}

#[allow(clippy::cast_possible_wrap)]
const fn int(value: u64) -> i64 {
    value as i64
}

fn world_arg(value: i64) -> Option<WorldId> {
    (value != 0).then(|| WorldId::new(bits(value)))
}

fn create_entity(ctx: &NativeContext, args: &[i64]) -> i64 {
    let &[world] = args else { return -1 };
    if world == 0 {
        return -1;
    }
    ctx.scope(world)
        .map_or(-1, |scope| int(scope.alloc_entity().to_bits()))
}

fn has_entity(ctx: &NativeContext, args: &[i64]) -> i64 {
    let &[world, entity] = args else { return 0 };
    let entity = EntityId::from_bits(bits(entity));
    i64::from(ctx.scope(world).is_some_and(|scope| scope.has_entity(entity)))
}

fn has_component(ctx: &NativeContext, args: &[i64]) -> i64 {
    let &[world, entity, hash] = args else { return 0 };
    let entity = EntityId::from_bits(bits(entity));
    let hash = TypeHash::from_raw(bits(hash));
    i64::from(
        ctx.scope(world)
            .is_some_and(|scope| scope.has_component(entity, hash)),
    )
}

fn has_system(ctx: &NativeContext, args: &[i64]) -> i64 {
    let &[world, hash] = args else { return 0 };
    let hash = TypeHash::from_raw(bits(hash));
    i64::from(ctx.scope(world).is_some_and(|scope| scope.has_system(hash)))
}

fn destroy_entity(ctx: &NativeContext, args: &[i64]) -> i64 {
    let &[world, entity] = args else { return 0 };
    ctx.push(ScriptCommand::DestroyEntity {
        world: WorldId::new(bits(world)),
        entity: EntityId::from_bits(bits(entity)),
    });
    1
}

fn add_component(ctx: &NativeContext, args: &[i64]) -> i64 {
    let &[world, entity, hash] = args else { return 0 };
    ctx.push(ScriptCommand::AddComponent {
        world: WorldId::new(bits(world)),
        entity: EntityId::from_bits(bits(entity)),
        type_hash: TypeHash::from_raw(bits(hash)),
    });
    1
}

fn remove_component(ctx: &NativeContext, args: &[i64]) -> i64 {
    let &[world, entity, hash] = args else { return 0 };
    ctx.push(ScriptCommand::RemoveComponent {
        world: WorldId::new(bits(world)),
        entity: EntityId::from_bits(bits(entity)),
        type_hash: TypeHash::from_raw(bits(hash)),
    });
    1
}

fn set_system_enabled(ctx: &NativeContext, args: &[i64]) -> i64 {
    let &[world, hash, enabled] = args else { return 0 };
    ctx.push(ScriptCommand::SetSystemEnabled {
        world: world_arg(world),
        type_hash: TypeHash::from_raw(bits(hash)),
        enabled: enabled != 0,
    });
    1
}

fn request_reload(ctx: &NativeContext, _args: &[i64]) -> i64 {
    ctx.signal().request();
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_enqueues_commands() {
        let queue = CommandQueue::new();
        let table = NativeTable::standard(NativeContext::new(queue.clone(), ReloadSignal::new()));

        let hash = TypeHash::of("Game.DebugName");
        #[allow(clippy::cast_possible_wrap)]
        let raw_hash = hash.get() as i64;

        assert_eq!(table.call("add_component", &[1, 7, raw_hash]), Some(1));
        assert_eq!(table.call("set_system_enabled", &[0, raw_hash, 0]), Some(1));
        // Arity mismatch and unknown names are refused.
        assert_eq!(table.call("add_component", &[1, 7]), None);
        assert_eq!(table.call("spawn_dragon", &[]), None);

        let commands = queue.drain();
        assert_eq!(
            commands,
            vec![
                ScriptCommand::AddComponent {
                    world: WorldId::new(1),
                    entity: EntityId::from_bits(7),
                    type_hash: hash,
                },
                ScriptCommand::SetSystemEnabled {
                    world: None,
                    type_hash: hash,
                    enabled: false,
                },
            ]
        );
    }

    #[test]
    fn test_create_entity_and_queries_use_the_directory() {
        let directory = WorldDirectory::new();
        let view = Arc::new(ScopeView::new());
        directory.insert(Some(WorldId::new(2)), Arc::clone(&view));
        let context = NativeContext::new(CommandQueue::new(), ReloadSignal::new())
            .with_directory(directory);
        let table = NativeTable::standard(context);

        let raw = table.call("create_entity", &[2]).unwrap();
        let entity = EntityId::from_bits(bits(raw));
        assert!(view.has_entity(entity));
        assert_eq!(table.call("has_entity", &[2, raw]), Some(1));

        let hash = TypeHash::of("Game.DebugName");
        let raw_hash = int(hash.get());
        assert_eq!(table.call("has_component", &[2, raw, raw_hash]), Some(0));
        view.mark_component(entity, hash, true);
        assert_eq!(table.call("has_component", &[2, raw, raw_hash]), Some(1));
        assert_eq!(table.call("has_system", &[2, raw_hash]), Some(0));

        // Unknown worlds and the global scope own no entities.
        assert_eq!(table.call("create_entity", &[9]), Some(-1));
        assert_eq!(table.call("create_entity", &[0]), Some(-1));
        assert_eq!(table.call("has_entity", &[9, raw]), Some(0));
    }

    #[test]
    fn test_request_reload_raises_signal() {
        let signal = ReloadSignal::new();
        let table = NativeTable::standard(NativeContext::new(CommandQueue::new(), signal.clone()));
        assert!(!signal.is_pending());
        assert_eq!(table.call("request_reload", &[]), Some(1));
        assert!(signal.is_pending());
    }

    #[test]
    fn test_register_replaces_by_name() {
        fn answer(_: &NativeContext, _: &[i64]) -> i64 {
            42
        }
        let mut table = NativeTable::standard(NativeContext::default());
        let before = table.entries().len();
        table.register("request_reload", 0, answer);
        assert_eq!(table.entries().len(), before);
        assert_eq!(table.call("request_reload", &[]), Some(42));
    }
}
