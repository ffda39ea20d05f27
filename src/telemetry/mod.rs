//! Counters and diagnostics.
//!
//! This module provides:
//! - Prometheus counters for reads, rotations, truncations and watcher events
//! - Tracing subscriber setup for the binary

mod metrics;
mod observability;

pub use metrics::{global_metrics, Metrics};
pub use observability::init_tracing;
