//! # Hot-Reload Orchestrator
//!
//! Tears the scripting layer down and brings it back without touching native
//! state. Every reload runs these steps, in order, between frames:
//!
//! 1. pre-reload callbacks
//! 2. release every mirror in every world and the global registry
//! 3. tear down the scripting domain and its type table
//! 4. load every image again, in registration order
//! 5. bind a fresh mirror to every live native instance
//! 6. post-reload callbacks
//!
//! Step 2 always completes before step 3 starts. A type missing from the new
//! images only leaves its instances mirror-less.
//!
//! Other threads never reload directly. They raise a [`ReloadSignal`] and the
//! main loop picks it up in [`Engine::poll_reload`].
//!
//! Once the engine is shut down the bridge stays `Unloaded`: every reload
//! entry point refuses and pending requests are dropped.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bridge::ImageError;
use crate::engine::Engine;
use crate::mirror::{BindContext, BindReport};
use crate::type_id::TypeHash;

const IDLE: u8 = 0;
const REQUESTED: u8 = 1;
const FORCED: u8 = 2;

/// How a reload was asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadKind {
    /// Reload only if an image changed on disk.
    Requested,
    /// Reload unconditionally.
    Forced,
}

/// Cross-thread "reload wanted" flag.
///
/// Cloning shares the flag. A forced request supersedes a pending normal one;
/// a normal request never downgrades a forced one.
#[derive(Clone, Debug, Default)]
pub struct ReloadSignal {
    state: Arc<AtomicU8>,
}

impl ReloadSignal {
    /// Creates an idle signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for a reload if any image changed.
    pub fn request(&self) {
        let _ = self
            .state
            .compare_exchange(IDLE, REQUESTED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Asks for an unconditional reload.
    pub fn force(&self) {
        self.state.store(FORCED, Ordering::Release);
    }

    /// Takes the pending request, leaving the signal idle.
    #[must_use]
    pub fn take(&self) -> Option<ReloadKind> {
        match self.state.swap(IDLE, Ordering::AcqRel) {
            REQUESTED => Some(ReloadKind::Requested),
            FORCED => Some(ReloadKind::Forced),
            _ => None,
        }
    }

    /// Returns `true` if a request is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) != IDLE
    }
}

/// Which side of a reload a callback runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadPhase {
    /// Before any mirror is released.
    Pre,
    /// After every live instance was rebound.
    Post,
}

/// Passed to reload callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReloadEvent {
    /// Callback phase.
    pub phase: ReloadPhase,
    /// Why the reload runs.
    pub kind: ReloadKind,
    /// Generation being torn down (`Pre`) or just loaded (`Post`).
    pub generation: u64,
}

/// Reload callback.
pub type ReloadCallback = Box<dyn FnMut(&ReloadEvent) + Send>;

/// What a reload did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReloadReport {
    /// Why the reload ran.
    pub kind: ReloadKind,
    /// Generation after the reload.
    pub generation: u64,
    /// Mirrors released in step 2.
    pub released: usize,
    /// Instances that got a mirror back in step 5.
    pub rebound: usize,
    /// Instances left mirror-less.
    pub failed: usize,
    /// Types that found no script counterpart, sorted.
    pub unbound: Vec<TypeHash>,
    /// Images that failed to load in step 4.
    pub image_errors: Vec<ImageError>,
}

impl ReloadReport {
    /// Returns `true` if every instance was rebound and every image loaded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.image_errors.is_empty()
    }
}

impl Engine {
    /// Registers a callback run before every reload.
    pub fn on_pre_reload(&mut self, callback: impl FnMut(&ReloadEvent) + Send + 'static) {
        self.pre_reload.push(Box::new(callback));
    }

    /// Registers a callback run after every reload.
    pub fn on_post_reload(&mut self, callback: impl FnMut(&ReloadEvent) + Send + 'static) {
        self.post_reload.push(Box::new(callback));
    }

    /// Reloads the scripting layer unconditionally.
    ///
    /// Returns `None` after [`Engine::shutdown`].
    pub fn reload(&mut self) -> Option<ReloadReport> {
        if self.is_shut_down() {
            warn!("reload refused, engine is shut down");
            return None;
        }
        Some(self.run_reload(ReloadKind::Forced))
    }

    /// Reloads only if an image changed since it was loaded.
    ///
    /// Returns `None` after [`Engine::shutdown`].
    pub fn reload_if_changed(&mut self) -> Option<ReloadReport> {
        if self.is_shut_down() {
            warn!("reload refused, engine is shut down");
            return None;
        }
        if self.bridge.images_changed() {
            Some(self.run_reload(ReloadKind::Requested))
        } else {
            debug!("images unchanged, reload skipped");
            None
        }
    }

    /// Services a pending [`ReloadSignal`], if any.
    pub fn poll_reload(&mut self) -> Option<ReloadReport> {
        let kind = self.signal.take()?;
        if self.is_shut_down() {
            debug!(?kind, "reload request dropped after shutdown");
            return None;
        }
        match kind {
            ReloadKind::Forced => self.reload(),
            ReloadKind::Requested => self.reload_if_changed(),
        }
    }

    fn run_reload(&mut self, kind: ReloadKind) -> ReloadReport {
        let old_generation = self.bridge.generation();
        info!(generation = old_generation, ?kind, "hot reload starting");

        // Pre-reload callbacks.
        let event = ReloadEvent {
            phase: ReloadPhase::Pre,
            kind,
            generation: old_generation,
        };
        for callback in &mut self.pre_reload {
            callback(&event);
        }

        // Release every mirror before the domain goes away.
        let mut released = self.systems.invalidate_all_mirrors(&self.bridge);
        for world in self.worlds.values_mut() {
            released += world.invalidate_mirrors();
        }
        debug!(released, "mirrors invalidated");

        // Drop the domain, then load every image again.
        self.bridge.begin_reload();
        let image_errors = self.bridge.finish_reload();
        let generation = self.bridge.generation();

        // Rebind every live instance, inactive worlds included.
        let mut binds: BindReport = self
            .systems
            .bind_missing_mirrors(BindContext::new(&self.bridge, None, true));
        for world in self.worlds.values_mut() {
            binds.merge(world.bind_missing_mirrors());
        }
        if !binds.unbound.is_empty() {
            warn!(
                types = binds.unbound.len(),
                instances = binds.failed,
                "types lost their script counterpart, instances left mirror-less"
            );
        }

        // Post-reload callbacks.
        let event = ReloadEvent {
            phase: ReloadPhase::Post,
            kind,
            generation,
        };
        for callback in &mut self.post_reload {
            callback(&event);
        }

        info!(
            generation,
            released,
            rebound = binds.bound,
            failed = binds.failed,
            "hot reload finished"
        );
        ReloadReport {
            kind,
            generation,
            released,
            rebound: binds.bound,
            failed: binds.failed,
            unbound: binds.unbound.into_iter().collect(),
            image_errors,
        }
    }
}
