//! Configuration management for logtail.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables (`LOGTAIL_*`)
//! - JSON configuration file (lowest priority)

mod settings;

pub use settings::Config;
