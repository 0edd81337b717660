//! # Deferred Script Commands
//!
//! Scripts run inside update/draw passes, while the stores they would like to
//! mutate are borrowed by that pass. Native entry points therefore only record
//! what the script asked for; the engine applies the queue between passes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::id::{EntityId, WorldId};
use crate::type_id::TypeHash;

/// A mutation requested by the scripting layer, expressed in IDs only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptCommand {
    /// Destroy an entity and all of its components.
    DestroyEntity {
        /// Owning world.
        world: WorldId,
        /// Entity to destroy.
        entity: EntityId,
    },
    /// Add a registered component type to an entity.
    AddComponent {
        /// Owning world.
        world: WorldId,
        /// Target entity.
        entity: EntityId,
        /// Component type.
        type_hash: TypeHash,
    },
    /// Remove a component type from an entity.
    RemoveComponent {
        /// Owning world.
        world: WorldId,
        /// Target entity.
        entity: EntityId,
        /// Component type.
        type_hash: TypeHash,
    },
    /// Enable or disable a system.
    SetSystemEnabled {
        /// Owning world, `None` for the global registry.
        world: Option<WorldId>,
        /// System type.
        type_hash: TypeHash,
        /// New state.
        enabled: bool,
    },
}

/// Shared FIFO of pending script commands.
#[derive(Clone, Debug, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<Vec<ScriptCommand>>>,
}

impl CommandQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    pub fn push(&self, command: ScriptCommand) {
        self.inner.lock().push(command);
    }

    /// Takes every pending command, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<ScriptCommand> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Number of pending commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_is_fifo_and_empties() {
        let queue = CommandQueue::new();
        let writer = queue.clone();
        let world = WorldId::new(1);

        writer.push(ScriptCommand::DestroyEntity {
            world,
            entity: EntityId::new(0, 0),
        });
        writer.push(ScriptCommand::DestroyEntity {
            world,
            entity: EntityId::new(1, 0),
        });
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(
            drained[0],
            ScriptCommand::DestroyEntity { entity, .. } if entity.index() == 0
        ));
        assert!(queue.is_empty());
    }
}
