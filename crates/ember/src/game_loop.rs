//! # EMBER Game Loop
//!
//! ```text
//! Frame N:
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. BEGIN FRAME                                               │
//! │    └─ Measure delta time (clamped)                           │
//! │                                                              │
//! │ 2. ENGINE FRAME                                              │
//! │    ├─ Service a pending reload (watcher or script request)   │
//! │    ├─ Update pass + queued script commands                   │
//! │    └─ Draw pass                                              │
//! │                                                              │
//! │ 3. END FRAME                                                 │
//! │    ├─ Record FrameStats                                      │
//! │    └─ Sleep out the rest of the frame budget                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ember_core::{Engine, FrameReport};
use tracing::{info, warn};

use crate::config::LoopConfig;
use crate::watcher::ImageWatcher;

/// Longest delta time handed to the engine, in seconds.
pub const MAX_DELTA: f32 = 0.1;

/// Timing and outcome of one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number.
    pub frame: u64,
    /// Whole frame, reload included, in microseconds.
    pub total_us: u64,
    /// Update pass and command application, in microseconds.
    pub update_us: u64,
    /// Draw pass, in microseconds.
    pub draw_us: u64,
    /// 1 if a reload ran at the start of the frame.
    pub reloads: u32,
    /// Hooks that failed in either pass.
    pub failed_hooks: usize,
    /// Script commands applied.
    pub commands: usize,
}

impl FrameStats {
    fn from_report(report: &FrameReport, total: Duration) -> Self {
        Self {
            frame: report.frame,
            total_us: micros(total),
            update_us: micros(report.update_time),
            draw_us: micros(report.draw_time),
            reloads: u32::from(report.reload.is_some()),
            failed_hooks: report.update.failed + report.draw.failed,
            commands: report.commands,
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Clonable handle that asks a running [`GameLoop`] to stop after the
/// current frame.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests the stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Drives an [`Engine`] frame by frame.
pub struct GameLoop {
    engine: Engine,
    config: LoopConfig,
    watcher: Option<ImageWatcher>,
    stop: StopHandle,
    last_frame_time: Instant,
    stats: FrameStatsAccumulator,
}

impl GameLoop {
    /// Creates a loop around `engine`.
    #[must_use]
    pub fn new(engine: Engine, config: LoopConfig) -> Self {
        Self {
            engine,
            config,
            watcher: None,
            stop: StopHandle::default(),
            last_frame_time: Instant::now(),
            stats: FrameStatsAccumulator::new(),
        }
    }

    /// Keeps `watcher` alive for as long as the loop runs.
    #[must_use]
    pub fn with_watcher(mut self, watcher: ImageWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Runs one frame with the measured delta time.
    pub fn step(&mut self) -> FrameStats {
        let now = Instant::now();
        let delta = now.duration_since(self.last_frame_time).as_secs_f32().min(MAX_DELTA);
        self.last_frame_time = now;
        self.step_with(delta)
    }

    /// Runs one frame with a fixed delta time.
    pub fn step_with(&mut self, delta_time: f32) -> FrameStats {
        let started = Instant::now();
        let report = self.engine.run_frame(delta_time);
        let stats = FrameStats::from_report(&report, started.elapsed());

        if let Some(reload) = &report.reload {
            info!(
                frame = report.frame,
                generation = reload.generation,
                clean = reload.is_clean(),
                "scripts reloaded"
            );
        }
        if let Some(budget) = self.config.frame_budget() {
            if stats.total_us > micros(budget) * 2 {
                warn!(
                    frame = stats.frame,
                    total_us = stats.total_us,
                    budget_us = micros(budget),
                    "frame exceeded budget"
                );
            }
        }

        self.stats.record(stats, self.config.frame_budget());
        stats
    }

    /// Runs until `max_frames` frames ran or a stop is requested, pacing to
    /// `target_fps`.
    pub fn run(&mut self) -> &FrameStatsAccumulator {
        let budget = self.config.frame_budget();
        self.last_frame_time = Instant::now();

        while !self.stop.is_stopped() {
            if self.config.max_frames > 0 && self.stats.frames_recorded >= self.config.max_frames {
                break;
            }
            let started = Instant::now();
            self.step();
            if let Some(rest) = budget.and_then(|b| b.checked_sub(started.elapsed())) {
                std::thread::sleep(rest);
            }
        }

        info!(frames = self.stats.frames_recorded, "game loop finished");
        &self.stats
    }

    /// Handle that stops [`GameLoop::run`] from another thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The driven engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The driven engine, mutably.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Frames run so far.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.stats.frames_recorded
    }

    /// Accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }

    /// Stops the watcher and shuts the engine down. Returns the statistics.
    pub fn finish(mut self) -> FrameStatsAccumulator {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.engine.shutdown();
        self.stats
    }
}

impl std::fmt::Debug for GameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameLoop")
            .field("config", &self.config)
            .field("watching", &self.watcher.is_some())
            .field("frames", &self.stats.frames_recorded)
            .finish_non_exhaustive()
    }
}

/// Accumulator for frame statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameStatsAccumulator {
    /// Total frames recorded.
    pub frames_recorded: u64,
    /// Sum of total frame times.
    pub total_us_sum: u64,
    /// Sum of update times.
    pub update_us_sum: u64,
    /// Sum of draw times.
    pub draw_us_sum: u64,
    /// Min frame time.
    pub min_frame_us: u64,
    /// Max frame time.
    pub max_frame_us: u64,
    /// Frames that exceeded the budget.
    pub frames_over_budget: u64,
    /// Reloads serviced.
    pub reloads: u64,
    /// Failed hooks across all frames.
    pub failed_hooks: u64,
    /// Script commands applied across all frames.
    pub commands: u64,
}

impl FrameStatsAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_recorded: 0,
            total_us_sum: 0,
            update_us_sum: 0,
            draw_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            reloads: 0,
            failed_hooks: 0,
            commands: 0,
        }
    }

    /// Records a frame's statistics.
    pub fn record(&mut self, stats: FrameStats, budget: Option<Duration>) {
        self.frames_recorded += 1;
        self.total_us_sum += stats.total_us;
        self.update_us_sum += stats.update_us;
        self.draw_us_sum += stats.draw_us;
        self.min_frame_us = self.min_frame_us.min(stats.total_us);
        self.max_frame_us = self.max_frame_us.max(stats.total_us);
        self.reloads += u64::from(stats.reloads);
        self.failed_hooks += stats.failed_hooks as u64;
        self.commands += stats.commands as u64;

        if budget.is_some_and(|b| stats.total_us > micros(b)) {
            self.frames_over_budget += 1;
        }
    }

    /// Average frame time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Average frames per second of engine work, sleep excluded.
    #[must_use]
    pub fn avg_fps(&self) -> f64 {
        let avg_ms = self.avg_frame_ms();
        if avg_ms <= 0.0 {
            return 0.0;
        }
        1000.0 / avg_ms
    }

    /// Share of frames over budget.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }

    /// Prints a summary of the statistics.
    #[allow(clippy::cast_precision_loss)]
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════════╗");
        println!("║                    FRAME STATISTICS SUMMARY                      ║");
        println!("╚══════════════════════════════════════════════════════════════════╝");
        println!();
        println!("┌─ TIMING ─────────────────────────────────────────────────────────┐");
        println!("│ Frames Recorded:    {}", self.frames_recorded);
        println!("│ Average Frame:      {:.3} ms ({:.1} FPS)", self.avg_frame_ms(), self.avg_fps());
        if self.frames_recorded > 0 {
            let frames = self.frames_recorded as f64;
            println!("│ Min Frame:          {:.3} ms", self.min_frame_us as f64 / 1000.0);
            println!("│ Max Frame:          {:.3} ms", self.max_frame_us as f64 / 1000.0);
            println!("│ Update:             {:.3} ms", self.update_us_sum as f64 / frames / 1000.0);
            println!("│ Draw:               {:.3} ms", self.draw_us_sum as f64 / frames / 1000.0);
        }
        println!(
            "│ Over Budget:        {} frames ({:.1}%)",
            self.frames_over_budget,
            self.over_budget_ratio() * 100.0
        );
        println!("└──────────────────────────────────────────────────────────────────┘");
        println!();
        println!("┌─ SCRIPTING ──────────────────────────────────────────────────────┐");
        println!("│ Reloads:            {}", self.reloads);
        println!("│ Failed Hooks:       {}", self.failed_hooks);
        println!("│ Script Commands:    {}", self.commands);
        println!("└──────────────────────────────────────────────────────────────────┘");
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
