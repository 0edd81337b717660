//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::error::{AppError, AppResult};

/// Builds the filter: `RUST_LOG` when set, `level` otherwise.
#[must_use]
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs the global fmt subscriber.
///
/// # Errors
///
/// [`AppError::Logging`] if a global subscriber is already installed.
pub fn init(level: &str) -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .try_init()
        .map_err(|err| AppError::Logging(err.to_string()))
}
