//! Log watcher combining native notifications with a polling fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, OnceCell};

use super::events::ChangeEvent;
use super::native::{is_permission_denied, NativeBackend};
use super::path::absolute_path;
use super::poll::PollDriver;
use super::registry::{Handle, Registry};
use crate::error::WatcherError;
use crate::telemetry::Metrics;
use crate::Result;

/// Poll interval used when nothing else would detect changes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Log watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Interval between synthetic updates. Zero disables polling while the
    /// native backend is running.
    pub poll_interval: Duration,
    /// Use OS change notifications.
    pub enable_native: bool,
    /// Directories that never receive a native watch.
    pub excluded_dirs: Vec<PathBuf>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            enable_native: true,
            excluded_dirs: vec![PathBuf::from("/dev")],
        }
    }
}

impl WatcherConfig {
    /// Poll interval to run with, given whether the native backend started.
    ///
    /// Never returns `None` without a native backend, so the watcher is
    /// never blind.
    #[must_use]
    pub fn effective_poll_interval(&self, native_active: bool) -> Option<Duration> {
        if !self.poll_interval.is_zero() {
            Some(self.poll_interval)
        } else if native_active {
            None
        } else {
            Some(DEFAULT_POLL_INTERVAL)
        }
    }
}

/// Watches log paths and fans change events out to subscriber queues.
pub struct LogWatcher {
    registry: Arc<Registry>,
    native: Mutex<Option<NativeBackend>>,
    poll: Mutex<Option<PollDriver>>,
    excluded_dirs: Vec<PathBuf>,
    closed: OnceCell<()>,
}

impl LogWatcher {
    /// Create a watcher and start its background tasks.
    ///
    /// A native backend that fails to start is logged and replaced by polling.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if an excluded directory cannot be resolved.
    pub fn new(config: &WatcherConfig, metrics: Arc<Metrics>) -> Result<Self> {
        let excluded_dirs = config
            .excluded_dirs
            .iter()
            .map(absolute_path)
            .collect::<std::io::Result<Vec<_>>>()?;

        let registry = Arc::new(Registry::new());

        let native = if config.enable_native {
            match NativeBackend::start(Arc::clone(&registry), metrics) {
                Ok(backend) => Some(backend),
                Err(e) => {
                    tracing::warn!(error = %e, "Native file watching unavailable");
                    None
                }
            }
        } else {
            None
        };

        let poll_interval = config.effective_poll_interval(native.is_some());
        let poll = poll_interval.map(|interval| PollDriver::start(interval, Arc::clone(&registry)));

        tracing::info!(
            native = native.is_some(),
            poll_interval = ?poll_interval,
            "Log watcher started"
        );

        Ok(Self {
            registry,
            native: Mutex::new(native),
            poll: Mutex::new(poll),
            excluded_dirs,
            closed: OnceCell::new(),
        })
    }

    /// Allocate a new subscriber queue.
    pub fn subscribe(&self) -> (Handle, mpsc::Receiver<ChangeEvent>) {
        self.registry.subscribe()
    }

    /// Whether the native backend is running.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.native.lock().is_some()
    }

    /// Start delivering events for `path` to the queue behind `handle`.
    ///
    /// If the path is already watched nothing changes: the new handle does not
    /// replace the old one.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown handle, after close, or if the native
    /// watch fails for a reason other than permissions.
    pub fn add(&self, path: impl AsRef<Path>, handle: Handle) -> Result<()> {
        let queue = self.registry.queue(handle)?;
        let path = path.as_ref();
        let abs_path = absolute_path(path).map_err(|e| WatcherError::WatchFailed {
            path: path.display().to_string(),
            reason: format!("failed to lookup absolute path: {e}"),
        })?;
        if self.registry.contains(&abs_path) {
            return Ok(());
        }

        if self.is_excluded(&abs_path) {
            tracing::debug!(path = %abs_path.display(), "Skipping native watch on excluded path");
        } else if let Some(native) = self.native.lock().as_mut() {
            tracing::debug!(path = %abs_path.display(), "Adding a watch on resolved path");
            watch_outcome(&abs_path, native.watch(&abs_path))?;
        }

        self.registry.insert(abs_path, queue)?;
        Ok(())
    }

    /// Whether `path` (a file or a directory) is being watched.
    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        match absolute_path(path.as_ref()) {
            Ok(abs_path) => self.registry.contains(&abs_path),
            Err(e) => {
                tracing::debug!(path = %path.as_ref().display(), error = %e, "Couldn't resolve path");
                false
            }
        }
    }

    /// Stop watching `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the native backend fails to drop its watch.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        let abs_path = absolute_path(path.as_ref())?;
        self.registry.remove(&abs_path);

        if self.is_excluded(&abs_path) {
            return Ok(());
        }
        if let Some(native) = self.native.lock().as_mut() {
            native
                .unwatch(&abs_path)
                .map_err(|e| WatcherError::UnwatchFailed {
                    path: abs_path.display().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Shut down the watcher. Safe to call from multiple tasks.
    ///
    /// Both drivers are stopped and drained before the subscriber queues close,
    /// so no event reaches a queue after it ends. Concurrent callers wait for
    /// the same shutdown.
    pub async fn close(&self) {
        self.closed.get_or_init(|| self.shutdown()).await;
    }

    async fn shutdown(&self) {
        let native = self.native.lock().take();
        if let Some(native) = native {
            native.stop().await;
        }

        let poll = self.poll.lock().take();
        if let Some(poll) = poll {
            poll.stop().await;
        }

        tracing::info!("Closing events channels");
        self.registry.close();
    }

    fn is_excluded(&self, abs_path: &Path) -> bool {
        self.excluded_dirs.iter().any(|dir| dir == abs_path)
    }
}

/// Decide whether a native watch failure fails `add`.
///
/// Permission denied is tolerated: the path is still recorded and served by
/// polling.
fn watch_outcome(
    abs_path: &Path,
    result: notify::Result<()>,
) -> std::result::Result<(), WatcherError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if is_permission_denied(&e) => {
            tracing::debug!(path = %abs_path.display(), "Skipping permission denied error on adding a watch");
            Ok(())
        }
        Err(e) => Err(WatcherError::WatchFailed {
            path: abs_path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}
