//! # Core Error Types
//!
//! Absence is never an error in EMBER: lookups return `Option`, removals
//! return `bool`. The types here cover the scripting layer and the few
//! engine operations that can genuinely fail.

use thiserror::Error;

use crate::id::{ObjectId, WorldId};
use crate::script::ScriptTypeId;
use crate::type_id::{TypeHash, TypeKind};

/// Errors reported by a scripting runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The runtime was used before `start` or after it failed.
    #[error("scripting runtime is not started")]
    NotStarted,

    /// The runtime itself could not be brought up.
    #[error("scripting runtime failed to start: {0}")]
    Startup(String),

    /// An image could not be read.
    #[error("failed to open image `{image}`: {reason}")]
    ImageOpen {
        /// Image name.
        image: String,
        /// Underlying cause.
        reason: String,
    },

    /// An image was read but its content is malformed.
    #[error("invalid image `{image}`: {reason}")]
    InvalidImage {
        /// Image name.
        image: String,
        /// Underlying cause.
        reason: String,
    },

    /// Script source failed to compile.
    #[error("failed to compile `{name}`: {reason}")]
    Compile {
        /// Qualified name of the type whose source failed.
        name: String,
        /// Compiler message.
        reason: String,
    },

    /// The runtime has no type with this handle in the current generation.
    #[error("unknown script type {0:?}")]
    UnknownType(ScriptTypeId),

    /// The runtime has no object with this ID.
    #[error("unknown script object {0}")]
    UnknownObject(ObjectId),

    /// A lifecycle hook raised an error.
    #[error("hook `{hook}` failed: {reason}")]
    Hook {
        /// Script-side hook name.
        hook: &'static str,
        /// Error raised by the script.
        reason: String,
    },
}

/// Why a native instance could not get a mirror.
///
/// Never fatal: the instance stays mirror-less and binding is retried on the
/// next access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingFailure {
    /// No scripting image is currently loaded.
    #[error("scripting layer is not loaded")]
    NotLoaded,

    /// The loaded images declare no type for this hash.
    #[error("no script type bound to {0}")]
    Unbound(TypeHash),

    /// The script type bound to this hash has the other kind.
    #[error("{type_hash} is a native {native} but the script declares a {declared}")]
    KindMismatch {
        /// Structural identity of the native type.
        type_hash: TypeHash,
        /// Kind of the native owner.
        native: TypeKind,
        /// Kind the image declared.
        declared: TypeKind,
    },

    /// The runtime refused to create the object.
    #[error(transparent)]
    Runtime(#[from] ScriptError),
}

/// Errors raised by engine-level operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The scripting runtime could not start, or a startup image could not be opened.
    #[error("fatal scripting initialisation failure: {0}")]
    FatalInit(#[source] ScriptError),

    /// No world with this ID exists.
    #[error("world not found: {0}")]
    WorldNotFound(WorldId),

    /// Two different native types hash to the same structural identity.
    #[error("type hash collision on {hash}: `{existing}` vs `{incoming}`")]
    TypeCollision {
        /// The colliding hash.
        hash: TypeHash,
        /// Type registered first.
        existing: &'static str,
        /// Type that was rejected.
        incoming: &'static str,
    },

    /// No native type is registered under this hash.
    #[error("unknown native type {0}")]
    UnknownType(TypeHash),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
