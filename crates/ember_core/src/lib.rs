//! # EMBER Core
//!
//! Entity-component-system runtime whose native object model stays in sync
//! with a separate, hot-reloadable scripting object model.
//!
//! ## Architecture Rules
//!
//! 1. **Native state is the source of truth** - a reload only ever touches mirrors
//! 2. **IDs across the boundary** - scripts see entity, world and type-hash values, never pointers
//! 3. **Generation-tagged mirrors** - a handle from an old generation reads as absent
//! 4. **Reloads between frames** - other threads only raise a [`ReloadSignal`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_core::{Component, Engine, ImageSource};
//!
//! let mut engine = Engine::builder()
//!     .runtime(my_runtime)
//!     .image(ImageSource::file("scripts/game.toml"))
//!     .build()?;
//!
//! let world = engine.create_world("main");
//! let w = engine.get_world_mut(world).unwrap();
//! let e = w.create_entity();
//! w.add_component::<DebugName>(e);
//!
//! engine.run_frame(1.0 / 60.0);
//! engine.reload();
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bridge;
pub mod commands;
pub mod component;
pub mod directory;
pub mod engine;
pub mod error;
pub mod id;
pub mod mirror;
pub mod registry;
pub mod reload;
pub mod script;
pub mod store;
pub mod system;
pub mod type_id;
pub mod world;

pub use bridge::{Bridge, BridgeState, BridgeStats, HookOutcome, ImageError};
pub use commands::{CommandQueue, ScriptCommand};
pub use component::Component;
pub use directory::{ScopeView, WorldDirectory};
pub use engine::{Engine, EngineBuilder, FrameReport};
pub use error::{BindingFailure, EngineError, EngineResult, ScriptError};
pub use id::{EntityAllocator, EntityId, ObjectId, WorldId};
pub use mirror::{BindContext, BindReport, Mirror, MirrorHandle};
pub use registry::{Constructor, TypeRegistry, TypeVTable};
pub use reload::{ReloadEvent, ReloadKind, ReloadPhase, ReloadReport, ReloadSignal};
pub use script::{
    DeclaredType, Hook, HookArgs, HookSet, ImageOrigin, ImageSource, LoadedImage, MirrorOwner,
    NativeContext, NativeEntry, NativeFn, NativeTable, ScriptRuntime, ScriptTypeId, WatchList,
};
pub use store::ComponentStore;
pub use system::{FrameContext, PassReport, System, SystemError, SystemRegistry, SystemStatus};
pub use type_id::{TypeHash, TypeInfo, TypeKind};
pub use world::World;
