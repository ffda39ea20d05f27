//! logtail
//!
//! Follows log files and named pipes, turning appended bytes into line
//! records while surviving rotation and in-place truncation.
//!
//! The [`watcher`] module reports file system changes per path; the
//! [`tailer`] module reacts to them by reading new content.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod tailer;
pub mod telemetry;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
