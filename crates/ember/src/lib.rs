//! # EMBER
//!
//! Application shell around [`ember_core`] and [`ember_script`].
//!
//! ```text
//!  ember.toml ──> EngineConfig ──> app::start ──> GameLoop::run
//!                                     │
//!                                     ├─ Engine (Rhai runtime, images)
//!                                     ├─ demo world
//!                                     └─ ImageWatcher ── ReloadSignal ──┐
//!                                                                       │
//!                                  run_frame polls the signal <─────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML configuration with defaults
//! - `logging`: tracing subscriber setup
//! - `watcher`: background image polling
//! - `game_loop`: frame pacing and statistics
//! - `demo`: native types mirrored by the bundled scripts

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod app;
pub mod config;
pub mod demo;
pub mod error;
pub mod game_loop;
pub mod logging;
pub mod watcher;

pub use ember_core as core;
pub use ember_script as script;

pub use config::{EngineConfig, LogConfig, LoopConfig, ScriptingConfig};
pub use error::{AppError, AppResult};
pub use game_loop::{FrameStats, FrameStatsAccumulator, GameLoop, StopHandle};
pub use watcher::ImageWatcher;
