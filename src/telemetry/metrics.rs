//! Prometheus metrics definitions.
//!
//! Counters live on an injected [`Registry`] so tests can use an isolated
//! registry instead of the process-wide default.

use std::sync::Arc;

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{Error, Result};

/// Counters maintained by the watcher and tailed files.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// IO errors per log file.
    pub log_errors: IntCounterVec,
    /// Rotations per log file.
    pub log_rotations: IntCounterVec,
    /// Truncations per log file.
    pub log_truncates: IntCounterVec,
    /// Lines read per log file.
    pub log_lines: IntCounterVec,
    /// Native watcher events per path.
    pub watcher_events: IntCounterVec,
    /// Native watcher errors.
    pub watcher_errors: IntCounter,
}

impl Metrics {
    /// Create the counters and register them on `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if a counter with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self> {
        let log_errors = counter_vec(
            "log_errors_total",
            "Number of IO errors encountered per log file",
            "log",
        )?;
        let log_rotations = counter_vec(
            "log_rotations_total",
            "Number of log rotation events per log file",
            "log",
        )?;
        let log_truncates = counter_vec(
            "log_truncates_total",
            "Number of log truncation events per log file",
            "log",
        )?;
        let log_lines = counter_vec(
            "log_lines_total",
            "Number of lines read per log file",
            "log",
        )?;
        let watcher_events = counter_vec(
            "log_watcher_event_count",
            "Number of native watcher events per path",
            "path",
        )?;
        let watcher_errors = IntCounter::new(
            "log_watcher_error_count",
            "Number of errors reported by the native watcher",
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(log_errors.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(log_rotations.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(log_truncates.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(log_lines.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(watcher_events.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(watcher_errors.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry: registry.clone(),
            log_errors,
            log_rotations,
            log_truncates,
            log_lines,
            watcher_events,
            watcher_errors,
        })
    }

    /// Create counters on a fresh, private registry.
    #[must_use]
    pub fn isolated() -> Arc<Self> {
        match Self::new(&Registry::new()) {
            Ok(metrics) => Arc::new(metrics),
            // A fresh registry has no name collisions.
            Err(e) => unreachable!("fresh registry rejected metrics: {e}"),
        }
    }

    /// Render every counter in Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_text(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(metric_error)
    }

    pub(crate) fn inc_log_error(&self, log: &str) {
        self.log_errors.with_label_values(&[log]).inc();
    }

    pub(crate) fn inc_rotation(&self, log: &str) {
        self.log_rotations.with_label_values(&[log]).inc();
    }

    pub(crate) fn inc_truncation(&self, log: &str) {
        self.log_truncates.with_label_values(&[log]).inc();
    }

    pub(crate) fn inc_line(&self, log: &str) {
        self.log_lines.with_label_values(&[log]).inc();
    }

    pub(crate) fn inc_watcher_event(&self, path: &str) {
        self.watcher_events.with_label_values(&[path]).inc();
    }

    pub(crate) fn inc_watcher_error(&self) {
        self.watcher_errors.inc();
    }
}

fn counter_vec(name: &str, help: &str, label: &str) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), &[label]).map_err(metric_error)
}

#[allow(clippy::needless_pass_by_value)]
fn metric_error(e: prometheus::Error) -> Error {
    Error::internal(format!("metrics: {e}"))
}

static GLOBAL_METRICS: Lazy<Result<Arc<Metrics>>> =
    Lazy::new(|| Metrics::new(prometheus::default_registry()).map(Arc::new));

/// Counters registered on the process-wide default registry.
///
/// # Errors
///
/// Returns an error if registration on the default registry failed.
pub fn global_metrics() -> Result<Arc<Metrics>> {
    match &*GLOBAL_METRICS {
        Ok(metrics) => Ok(Arc::clone(metrics)),
        Err(e) => Err(Error::internal(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_registries_do_not_share_counts() {
        let a = Metrics::isolated();
        let b = Metrics::isolated();

        a.inc_line("app.log");
        a.inc_line("app.log");

        assert_eq!(a.log_lines.with_label_values(&["app.log"]).get(), 2);
        assert_eq!(b.log_lines.with_label_values(&["app.log"]).get(), 0);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        assert!(Metrics::new(&registry).is_ok());
        assert!(Metrics::new(&registry).is_err());
    }

    #[test]
    fn test_encode_text_contains_counters() {
        let metrics = Metrics::isolated();
        metrics.inc_rotation("/var/log/syslog");
        metrics.inc_watcher_error();

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("log_rotations_total{log=\"/var/log/syslog\"} 1"));
        assert!(text.contains("log_watcher_error_count 1"));
    }

    #[test]
    fn test_global_metrics_is_shared() {
        let a = global_metrics().unwrap();
        let b = global_metrics().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
