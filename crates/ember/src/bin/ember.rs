//! # EMBER
//!
//! Runs the demo scene with hot-reloadable Rhai scripts.
//!
//! ```bash
//! # Default configuration
//! ember
//!
//! # Explicit configuration, verbose
//! RUST_LOG=debug ember crates/ember/assets/ember.toml
//! ```
//!
//! Edit any image listed in the configuration while it runs; the change is
//! picked up between two frames.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ember::{app, logging, AppResult, EngineConfig};

const DEFAULT_CONFIG: &str = "assets/ember.toml";

fn load_config(arg: Option<PathBuf>) -> AppResult<EngineConfig> {
    match arg {
        Some(path) => EngineConfig::load(&path),
        None if Path::new(DEFAULT_CONFIG).exists() => EngineConfig::load(Path::new(DEFAULT_CONFIG)),
        None => Ok(EngineConfig::default()),
    }
}

fn run() -> AppResult<()> {
    let config = load_config(std::env::args_os().nth(1).map(PathBuf::from))?;
    logging::init(&config.log.level)?;

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                         EMBER v{}", env!("CARGO_PKG_VERSION"));
    println!("═══════════════════════════════════════════════════════════════════");
    println!();
    println!("  Images:   {}", config.scripting.images.len());
    println!("  Watching: {}", config.scripting.watch);
    println!("  Target:   {} FPS", config.frame_loop.target_fps);
    println!();

    let mut game_loop = app::start(&config)?;
    game_loop.run();
    let stats = game_loop.finish();
    stats.print_summary();
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("✗ FATAL: {err}");
            ExitCode::FAILURE
        }
    }
}
