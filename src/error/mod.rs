//! Error types and Result aliases for logtail.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using logtail's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for logtail operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Change notification error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Tailed file error.
    #[error("tailer error: {0}")]
    Tailer(#[from] TailerError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Change notification errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to install a native watch on a path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// Failed to drop a native watch.
    #[error("failed to unwatch path '{path}': {reason}")]
    UnwatchFailed { path: String, reason: String },

    /// Subscription handle was never issued by this watcher.
    #[error("no such event handle {0}")]
    UnknownHandle(usize),

    /// The watcher has been closed.
    #[error("watcher is closed")]
    Closed,

    /// Native backend could not be constructed.
    #[error("native backend error: {0}")]
    Backend(String),
}

/// Tailed file errors.
#[derive(Error, Debug)]
pub enum TailerError {
    /// Only regular files and named pipes can be tailed.
    #[error("can't open files with mode {mode}: {path}")]
    UnsupportedFileType { path: String, mode: String },

    /// Opening the file failed.
    #[error("failed to open '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Stat on the open descriptor or the path failed.
    #[error("failed to stat '{path}': {reason}")]
    Stat { path: String, reason: String },

    /// Seek on the open descriptor failed.
    #[error("seek failed on '{path}': {reason}")]
    Seek { path: String, reason: String },

    /// A read returned an error other than end-of-stream.
    #[error("read failed on '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The line sink has been dropped.
    #[error("line sink closed for '{0}'")]
    SinkClosed(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl TailerError {
    /// Create an open error from an I/O failure.
    pub fn open(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Create a stat error from an I/O failure.
    pub fn stat(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Stat {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests;
