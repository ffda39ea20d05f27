//! Polling driver for systems where native notifications are unavailable or
//! unreliable (e.g., NFS).
//!
//! Every tick sends a synthetic update for each registered path; the tailed
//! file decides from its own stat whether anything changed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::events::ChangeEvent;
use super::registry::Registry;

/// A running poll task.
pub(crate) struct PollDriver {
    stop_ticks: CancellationToken,
    ticks_done: JoinHandle<()>,
}

impl PollDriver {
    /// Spawn the ticking task. Must be called from within a Tokio runtime.
    pub(crate) fn start(interval: Duration, registry: Arc<Registry>) -> Self {
        let stop_ticks = CancellationToken::new();
        let ticks_done = tokio::spawn(run_ticks(interval, registry, stop_ticks.clone()));
        Self {
            stop_ticks,
            ticks_done,
        }
    }

    /// Stop ticking and wait for the task to finish.
    pub(crate) async fn stop(mut self) {
        self.stop_ticks.cancel();
        if let Err(e) = (&mut self.ticks_done).await {
            tracing::error!(error = %e, "Poll task failed");
        }
    }
}

impl Drop for PollDriver {
    fn drop(&mut self) {
        self.stop_ticks.cancel();
    }
}

async fn run_ticks(interval: Duration, registry: Arc<Registry>, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            _ = ticker.tick() => {
                for (path, tx) in registry.snapshot() {
                    tokio::select! {
                        () = stop.cancelled() => return,
                        res = tx.send(ChangeEvent::update(path)) => {
                            if let Err(e) = res {
                                tracing::trace!(path = %e.0.path.display(), "Poll subscriber gone");
                            }
                        }
                    }
                }
            }
        }
    }
    tracing::debug!("Poll ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::events::ChangeKind;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_poll_sends_updates_for_registered_paths() {
        let registry = Arc::new(Registry::new());
        let (handle, mut rx) = registry.subscribe();
        registry
            .insert(PathBuf::from("/var/log/app.log"), registry.queue(handle).unwrap())
            .unwrap();

        let driver = PollDriver::start(Duration::from_millis(10), Arc::clone(&registry));
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.path, PathBuf::from("/var/log/app.log"));

        driver.stop().await;
    }

    #[tokio::test]
    async fn test_stop_unblocks_pending_send() {
        let registry = Arc::new(Registry::new());
        let (handle, _rx) = registry.subscribe();
        registry
            .insert(PathBuf::from("/a"), registry.queue(handle).unwrap())
            .unwrap();
        registry
            .insert(PathBuf::from("/b"), registry.queue(handle).unwrap())
            .unwrap();

        // Nobody reads, so the second send blocks once the queue is full.
        let driver = PollDriver::start(Duration::from_millis(5), registry);
        tokio::time::sleep(Duration::from_millis(30)).await;

        tokio::time::timeout(Duration::from_secs(1), driver.stop())
            .await
            .unwrap();
    }
}
