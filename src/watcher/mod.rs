//! File system change notification.
//!
//! This module provides:
//! - Native watching using notify-rs (inotify on Linux)
//! - A polling fallback for filesystems where notifications are unreliable
//! - Per-path fan-out of change events to subscriber queues

mod events;
mod log_watcher;
mod native;
mod path;
mod poll;
mod registry;

pub use events::{ChangeEvent, ChangeKind};
pub use log_watcher::{LogWatcher, WatcherConfig, DEFAULT_POLL_INTERVAL};
pub use path::absolute_path;
pub use registry::{Handle, QUEUE_CAPACITY};
