//! # Engine Configuration
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [scripting]
//! images = ["scripts/game.toml"]
//! watch = true
//! poll_interval_ms = 250
//! max_operations = 1000000
//!
//! [loop]
//! target_fps = 60
//! max_frames = 600
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Relative image paths are resolved against the configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// `[log]` section.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default filter directive. `RUST_LOG` overrides it.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// `[scripting]` section.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptingConfig {
    /// Image manifests, loaded in order.
    pub images: Vec<PathBuf>,
    /// Poll the images for changes on a background thread.
    pub watch: bool,
    /// Watcher poll period.
    pub poll_interval_ms: u64,
    /// Rhai operation budget per hook call.
    pub max_operations: u64,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            watch: true,
            poll_interval_ms: 250,
            max_operations: 1_000_000,
        }
    }
}

impl ScriptingConfig {
    /// Watcher poll period as a [`Duration`], never zero.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// `[loop]` section.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    /// Frames per second the loop paces itself to. 0 runs unpaced.
    pub target_fps: u32,
    /// Stop after this many frames. 0 runs until stopped.
    pub max_frames: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_frames: 0,
        }
    }
}

impl LoopConfig {
    /// Time budget of one frame, `None` when unpaced.
    #[must_use]
    pub fn frame_budget(&self) -> Option<Duration> {
        (self.target_fps > 0).then(|| Duration::from_secs(1) / self.target_fps)
    }
}

/// Full application configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging.
    pub log: LogConfig,
    /// Scripting layer and watcher.
    pub scripting: ScriptingConfig,
    /// Frame loop.
    #[serde(rename = "loop")]
    pub frame_loop: LoopConfig,
}

impl EngineConfig {
    /// Parses configuration text. `origin` only names the source in errors.
    ///
    /// # Errors
    ///
    /// [`AppError::Config`] on malformed TOML or unknown keys.
    pub fn parse(origin: &Path, text: &str) -> AppResult<Self> {
        toml::from_str(text).map_err(|err| AppError::Config {
            path: origin.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Loads a configuration file and resolves image paths against its directory.
    ///
    /// # Errors
    ///
    /// [`AppError::Io`] if the file cannot be read, [`AppError::Config`] if
    /// it is malformed.
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(path, &text)?;
        if let Some(base) = path.parent() {
            config.resolve_images(base);
        }
        Ok(config)
    }

    /// Makes every relative image path relative to `base`.
    pub fn resolve_images(&mut self, base: &Path) {
        for image in &mut self.scripting.images {
            if image.is_relative() {
                *image = base.join(&*image);
            }
        }
    }
}
