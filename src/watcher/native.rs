//! Native file system notifications using the `notify` crate.
//!
//! Uses OS-level notifications (inotify on Linux, FSEvents on macOS). The
//! `notify` callback runs on the backend's own thread; it only forwards into
//! two channels, one for events and one for errors, each drained by its own
//! task.

use std::io;
use std::path::Path;
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::{ChangeEvent, ChangeKind};
use super::registry::Registry;
use crate::error::WatcherError;
use crate::telemetry::Metrics;

/// Outcome of mapping a native signal onto the change model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Translation {
    /// Dispatch an event of this kind for every path.
    Dispatch(ChangeKind),
    /// Known signal that carries no content change.
    Ignore,
    /// The kernel queue overflowed and events were lost.
    Overflow,
    /// Signal outside the translated set.
    Unknown,
}

/// Map a `notify` event kind onto [`ChangeKind`].
pub(crate) fn translate(event: &Event) -> Translation {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            Translation::Dispatch(ChangeKind::Create)
        }
        // Both carries the from/to pair already reported as separate events.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) | EventKind::Access(_) => {
            Translation::Ignore
        }
        // Renamed away: the new name arrives as its own create.
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_) => {
            Translation::Dispatch(ChangeKind::Delete)
        }
        EventKind::Modify(_) => Translation::Dispatch(ChangeKind::Update),
        EventKind::Other if event.need_rescan() => Translation::Overflow,
        EventKind::Other | EventKind::Any => Translation::Unknown,
    }
}

/// True if a watch failed only because the path is not readable by us.
pub(crate) fn is_permission_denied(err: &notify::Error) -> bool {
    matches!(&err.kind, notify::ErrorKind::Io(e) if e.kind() == io::ErrorKind::PermissionDenied)
}

/// A running native watcher plus its two draining tasks.
pub(crate) struct NativeBackend {
    watcher: RecommendedWatcher,
    stop_dispatch: CancellationToken,
    events_done: JoinHandle<()>,
    errors_done: JoinHandle<()>,
}

impl NativeBackend {
    /// Create the OS watcher and spawn the draining tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn start(
        registry: Arc<Registry>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, WatcherError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => {
                    let _ = error_tx.send(e);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| WatcherError::Backend(e.to_string()))?;

        let stop_dispatch = CancellationToken::new();
        let events_done = tokio::spawn(run_events(
            event_rx,
            registry,
            Arc::clone(&metrics),
            stop_dispatch.clone(),
        ));
        let errors_done = tokio::spawn(run_errors(error_rx, metrics));

        Ok(Self {
            watcher,
            stop_dispatch,
            events_done,
            errors_done,
        })
    }

    pub(crate) fn watch(&mut self, path: &Path) -> notify::Result<()> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)
    }

    pub(crate) fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        self.watcher.unwatch(path)
    }

    /// Drop the OS watcher and wait for both tasks to drain.
    ///
    /// Dropping the watcher drops its callback, which closes both channels.
    pub(crate) async fn stop(self) {
        let Self {
            watcher,
            stop_dispatch,
            events_done,
            errors_done,
        } = self;
        // Close abandons undelivered events: anything still queued or blocked
        // on a full subscriber queue is drained and dropped.
        stop_dispatch.cancel();
        drop(watcher);

        if let Err(e) = events_done.await {
            tracing::error!(error = %e, "Native event task failed");
        }
        if let Err(e) = errors_done.await {
            tracing::error!(error = %e, "Native error task failed");
        }
    }
}

async fn run_events(
    mut rx: mpsc::UnboundedReceiver<Event>,
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    stop: CancellationToken,
) {
    while let Some(event) = rx.recv().await {
        tracing::trace!(?event, "watcher event");
        for path in &event.paths {
            metrics.inc_watcher_event(&path.to_string_lossy());
        }

        match translate(&event) {
            Translation::Dispatch(kind) => {
                for path in event.paths {
                    tokio::select! {
                        biased;
                        () = stop.cancelled() => break,
                        _ = registry.dispatch(ChangeEvent::new(kind, path)) => {}
                    }
                }
            }
            Translation::Ignore => {}
            Translation::Overflow => {
                tracing::warn!("Native event queue overflowed, relying on polling to catch up");
            }
            Translation::Unknown => {
                tracing::error!(kind = ?event.kind, "Unknown native event kind, stopping event processing");
                return;
            }
        }
    }
    tracing::info!("Shutting down log watcher");
}

async fn run_errors(mut rx: mpsc::UnboundedReceiver<notify::Error>, metrics: Arc<Metrics>) {
    while let Some(err) = rx.recv().await {
        metrics.inc_watcher_error();
        tracing::error!(error = %err, "Native watcher error");
    }
}
