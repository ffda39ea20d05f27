//! File system change event types.

#![allow(clippy::missing_const_for_fn)]

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of change observed on a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Path was created (or a file was renamed onto it).
    Create,
    /// Content or attributes changed, or a poll tick fired.
    Update,
    /// Path was removed or renamed away.
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A normalized change notification for one absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Absolute path the change applies to.
    pub path: PathBuf,
}

impl ChangeEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Create a create event.
    #[must_use]
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Create, path)
    }

    /// Create an update event.
    #[must_use]
    pub fn update(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Update, path)
    }

    /// Create a delete event.
    #[must_use]
    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Delete, path)
    }

    /// Path of the event.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}
