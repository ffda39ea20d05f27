//! Subscription registry and event dispatch.
//!
//! Subscribers get their own queue. Paths map onto those queues, several paths
//! may share one. Events are routed by exact path first and by parent
//! directory second, so a directory subscription sees entries appearing in it.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::events::ChangeEvent;
use crate::error::WatcherError;

/// Capacity of each subscriber queue.
///
/// Tokio channels need at least one slot; beyond that a send waits for the
/// consumer, so slow consumers apply backpressure to dispatch.
pub const QUEUE_CAPACITY: usize = 1;

/// Stable reference to a subscriber queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) usize);

impl Handle {
    /// Index of the queue in subscription order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Queue = mpsc::Sender<ChangeEvent>;

/// Path map and subscriber list, shared with the backend tasks.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    watched: RwLock<HashMap<PathBuf, Queue>>,
    subscribers: RwLock<Vec<Option<Queue>>>,
    closed: AtomicBool,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate a new queue. After close the receiver is already at end-of-stream.
    pub(crate) fn subscribe(&self) -> (Handle, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let mut subscribers = self.subscribers.write();
        let handle = Handle(subscribers.len());
        if self.closed.load(Ordering::Acquire) {
            subscribers.push(None);
        } else {
            subscribers.push(Some(tx));
        }
        (handle, rx)
    }

    /// Look up the queue behind `handle`.
    pub(crate) fn queue(&self, handle: Handle) -> Result<Queue, WatcherError> {
        match self.subscribers.read().get(handle.0) {
            Some(Some(tx)) => Ok(tx.clone()),
            Some(None) => Err(WatcherError::Closed),
            None => Err(WatcherError::UnknownHandle(handle.0)),
        }
    }

    /// Map `path` to `queue` unless the path is already mapped.
    ///
    /// Returns false if an earlier mapping was kept.
    pub(crate) fn insert(&self, path: PathBuf, queue: Queue) -> Result<bool, WatcherError> {
        let mut watched = self.watched.write();
        // Checked under the map lock so nothing is inserted after close clears it.
        if self.is_closed() {
            return Err(WatcherError::Closed);
        }
        if watched.contains_key(&path) {
            return Ok(false);
        }
        watched.insert(path, queue);
        Ok(true)
    }

    pub(crate) fn contains(&self, path: &Path) -> bool {
        self.watched.read().contains_key(path)
    }

    pub(crate) fn remove(&self, path: &Path) -> bool {
        self.watched.write().remove(path).is_some()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Every registered path with its queue.
    pub(crate) fn snapshot(&self) -> Vec<(PathBuf, Queue)> {
        self.watched
            .read()
            .iter()
            .map(|(path, tx)| (path.clone(), tx.clone()))
            .collect()
    }

    /// Find the queue for `path`, falling back to its parent directory.
    pub(crate) fn route(&self, path: &Path) -> Option<Queue> {
        let watched = self.watched.read();
        if let Some(tx) = watched.get(path) {
            return Some(tx.clone());
        }
        path.parent().and_then(|dir| watched.get(dir)).cloned()
    }

    /// Deliver `event` to its queue, waiting for capacity.
    ///
    /// Returns false if no queue is mapped or the subscriber went away. Both
    /// are expected: paths can be removed between notification and delivery.
    pub(crate) async fn dispatch(&self, event: ChangeEvent) -> bool {
        let Some(tx) = self.route(&event.path) else {
            tracing::debug!(path = %event.path.display(), "No channel for path");
            return false;
        };
        match tx.send(event).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                tracing::debug!(path = %event.path.display(), "Subscriber dropped its queue");
                false
            }
        }
    }

    /// Drop every queue sender so receivers observe end-of-stream.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.watched.write().clear();
        let mut subscribers = self.subscribers.write();
        for queue in subscribers.iter_mut() {
            queue.take();
        }
        tracing::info!(queues = subscribers.len(), "Closed event channels");
    }
}
