//! Application-level errors.

use std::path::PathBuf;

use ember_core::EngineError;
use thiserror::Error;

/// Errors raised while setting up or running the application shell.
#[derive(Error, Debug)]
pub enum AppError {
    /// The configuration file is malformed.
    #[error("invalid configuration `{path}`: {reason}")]
    Config {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A file could not be read.
    #[error("I/O error on `{path}`: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// The watcher thread could not be spawned.
    #[error("failed to spawn the image watcher: {0}")]
    Spawn(#[source] std::io::Error),

    /// The logging subscriber could not be installed.
    #[error("failed to initialise logging: {0}")]
    Logging(String),

    /// The engine refused to start.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result type for application operations.
pub type AppResult<T> = Result<T, AppError>;
