//! Wires configuration, the Rhai runtime, the watcher and the demo scene
//! into a ready-to-run [`GameLoop`].

use ember_core::{Engine, ImageSource, ReloadSignal};
use ember_script::{RhaiConfig, RhaiRuntime};
use tracing::info;

use crate::config::EngineConfig;
use crate::demo;
use crate::error::AppResult;
use crate::game_loop::GameLoop;
use crate::watcher::ImageWatcher;

/// Entities the demo world starts with.
pub const DEMO_ENTITIES: u32 = 8;

/// Builds an engine running the configured images on Rhai.
///
/// # Errors
///
/// [`crate::AppError::Engine`] if the runtime cannot start or a startup image
/// cannot be opened.
pub fn build_engine(config: &EngineConfig, signal: ReloadSignal) -> AppResult<Engine> {
    let runtime = RhaiRuntime::new(RhaiConfig {
        max_operations: config.scripting.max_operations,
        ..RhaiConfig::default()
    });
    let mut engine = Engine::builder()
        .runtime(runtime)
        .images(config.scripting.images.iter().map(ImageSource::file))
        .signal(signal)
        .build()?;
    demo::register(&mut engine)?;
    Ok(engine)
}

/// Builds the engine, populates the demo world and starts the watcher.
///
/// # Errors
///
/// Engine startup failures, or [`crate::AppError::Spawn`] if the watcher
/// thread cannot be created.
pub fn start(config: &EngineConfig) -> AppResult<GameLoop> {
    let signal = ReloadSignal::new();
    let mut engine = build_engine(config, signal.clone())?;
    let world = demo::populate(&mut engine, "main", DEMO_ENTITIES)?;
    info!(
        %world,
        images = config.scripting.images.len(),
        generation = engine.bridge().generation(),
        "engine ready"
    );

    let game_loop = GameLoop::new(engine, config.frame_loop.clone());
    if config.scripting.watch && !config.scripting.images.is_empty() {
        let watcher = ImageWatcher::spawn(
            game_loop.engine().bridge().watch_list(),
            config.scripting.poll_interval(),
            signal,
        )?;
        return Ok(game_loop.with_watcher(watcher));
    }
    Ok(game_loop)
}
