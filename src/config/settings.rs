//! Configuration settings and validation.

use crate::watcher::WatcherConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration for logtail.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log files (or named pipes) to tail.
    pub paths: Vec<PathBuf>,

    /// Interval between polls in milliseconds. Zero relies on native
    /// notifications alone when they are available.
    pub poll_interval_ms: u64,

    /// Use OS change notifications.
    pub enable_native: bool,

    /// Directories that never receive a native watch.
    pub excluded_dirs: Vec<PathBuf>,

    /// Read every file once from the start and exit.
    pub one_shot: bool,

    /// Start tailing at the beginning of existing files instead of the end.
    pub from_start: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit diagnostics as JSON.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            poll_interval_ms: 250,
            enable_native: true,
            excluded_dirs: vec![PathBuf::from("/dev")],
            one_shot: false,
            from_start: false,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            Error::config(format!("failed to parse config file {}: {e}", path.display()))
        })
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(Error::config("at least one path to tail is required"));
        }

        if !VALID_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                VALID_LEVELS.join(", ")
            )));
        }

        if let Some(dir) = self.excluded_dirs.iter().find(|dir| dir.is_relative()) {
            return Err(Error::config(format!(
                "excluded directory '{}' must be absolute",
                dir.display()
            )));
        }

        Ok(())
    }

    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Settings for the log watcher.
    #[must_use]
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_interval: self.poll_interval(),
            enable_native: self.enable_native,
            excluded_dirs: self.excluded_dirs.clone(),
        }
    }
}
