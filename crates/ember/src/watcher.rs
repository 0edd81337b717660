//! # Image Watcher
//!
//! Background thread polling image files, and the script files they name,
//! for changes.
//!
//! ```text
//!  watcher thread                      loop thread
//! ┌──────────────────┐  request()   ┌──────────────────────┐
//! │ stat every path  │ ───────────> │ ReloadSignal         │
//! │ on the WatchList │              │  polled by run_frame │
//! └──────────────────┘              └──────────────────────┘
//! ```
//!
//! The thread never touches the engine. It re-reads the [`WatchList`] every
//! tick, so files a reload adds are picked up; a path seen for the first time
//! only records its baseline. It compares modification time and length only;
//! the engine compares content digests before reloading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use ember_core::{ReloadSignal, WatchList};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// Observable state of one file. `None` when it cannot be read.
type Fingerprint = Option<(SystemTime, u64)>;

fn fingerprint(path: &Path) -> Fingerprint {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

/// Polls the files of a [`WatchList`] on a background thread and raises a
/// reload request when any of them changes.
#[derive(Debug)]
pub struct ImageWatcher {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ImageWatcher {
    /// Starts watching every path on `watch`.
    ///
    /// # Errors
    ///
    /// [`AppError::Spawn`] if the thread cannot be created.
    pub fn spawn(watch: WatchList, interval: Duration, signal: ReloadSignal) -> AppResult<Self> {
        let (shutdown, stop) = bounded::<()>(1);
        let mut seen: HashMap<PathBuf, Fingerprint> = watch
            .paths()
            .into_iter()
            .map(|path| {
                let last = fingerprint(&path);
                (path, last)
            })
            .collect();

        let handle = thread::Builder::new()
            .name("ember-watcher".into())
            .spawn(move || {
                info!(files = seen.len(), ?interval, "image watcher started");
                loop {
                    match stop.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let paths = watch.paths();
                    seen.retain(|path, _| paths.contains(path));
                    let mut changed = false;
                    for path in paths {
                        let now = fingerprint(&path);
                        match seen.insert(path, now) {
                            Some(last) if last != now => changed = true,
                            Some(_) => {}
                            None => debug!("new path on the watch list"),
                        }
                    }
                    if changed {
                        debug!("watched file changed on disk");
                        signal.request();
                    }
                }
                debug!("image watcher stopped");
            })
            .map_err(AppError::Spawn)?;

        Ok(Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for it. Calling it again does nothing.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Returns `true` while the thread runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ImageWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
