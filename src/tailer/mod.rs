//! Turning appended bytes into line records.
//!
//! This module provides:
//! - [`TailedFile`], which follows one file across rotation and truncation
//! - Incremental UTF-8 line assembly
//! - Drivers that feed a tailed file from a watcher queue or read it once

mod file;
mod line;
mod source;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use file::{is_sink_closed, TailedFile, READ_CHUNK_SIZE};
pub use line::{LineBuffer, LogLine};
pub use source::READ_DEADLINE;

use crate::telemetry::Metrics;
use crate::watcher::{ChangeEvent, LogWatcher};
use crate::Result;

/// Read each path once from the start and flush its trailing line.
///
/// Failures are logged per path and do not stop the others. Returns the
/// number of files read to the end.
pub async fn one_shot(
    paths: &[PathBuf],
    lines: mpsc::Sender<LogLine>,
    metrics: Arc<Metrics>,
) -> usize {
    let mut done = 0;
    for path in paths {
        let mut file =
            match TailedFile::open(path, lines.clone(), Arc::clone(&metrics), true).await {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to open log file");
                    continue;
                }
            };
        let read = file.read().await;
        let closed = file.close().await;
        match read.and(closed) {
            Ok(()) => done += 1,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read log file");
            }
        }
    }
    tracing::info!(files = done, "One-shot read complete");
    done
}

/// Follow `file` for every event on its path until the queue ends.
///
/// Events for other paths sharing the queue, such as a watched parent
/// directory, are skipped. Errors are logged and tailing continues, except
/// when the line sink has gone away.
///
/// # Errors
///
/// Returns an error if the line sink is closed.
pub async fn run(mut file: TailedFile, mut events: mpsc::Receiver<ChangeEvent>) -> Result<()> {
    while let Some(event) = events.recv().await {
        if event.path() != file.pathname() {
            tracing::trace!(event = %event, "Ignoring event for another path");
            continue;
        }
        if let Err(e) = file.follow().await {
            if is_sink_closed(&e) {
                return Err(e);
            }
            tracing::warn!(name = %file.name(), error = %e, "Failed to follow log file");
        }
    }
    tracing::debug!(name = %file.name(), "Event queue closed");
    file.close().await
}

/// Register `file` with `watcher` and follow it on a new task.
///
/// The parent directory is watched too, since creates after a rotation are
/// only reported there. Failing to watch the directory is logged; the file
/// is then served by polling.
///
/// # Errors
///
/// Returns an error if the file itself cannot be watched. No task is
/// spawned in that case.
pub fn spawn_follower(watcher: &LogWatcher, file: TailedFile) -> Result<JoinHandle<Result<()>>> {
    let (handle, events) = watcher.subscribe();
    watcher.add(file.pathname(), handle)?;
    if let Some(dir) = file.pathname().parent() {
        if let Err(e) = watcher.add(dir, handle) {
            tracing::warn!(dir = %dir.display(), error = %e, "Rotations in this directory rely on polling");
        }
    }
    tracing::info!(name = %file.name(), handle = handle.index(), "Tailing log file");
    Ok(tokio::spawn(run(file, events)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::{ChangeKind, WatcherConfig};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_one_shot_reads_whole_files() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.log");
        let b = tmp.path().join("b.log");
        std::fs::write(&a, "a1\na2").unwrap();
        std::fs::write(&b, "b1\n").unwrap();
        let missing = tmp.path().join("missing.log");

        let (tx, mut rx) = mpsc::channel(16);
        let read = one_shot(&[a, missing, b], tx, Metrics::isolated()).await;
        assert_eq!(read, 2);

        let mut texts = Vec::new();
        while let Some(line) = rx.recv().await {
            texts.push(line.text);
        }
        assert_eq!(texts, vec!["a1", "a2", "b1"]);
    }

    #[tokio::test]
    async fn test_run_follows_matching_events_and_flushes_on_end() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (line_tx, mut line_rx) = mpsc::channel(16);
        let file = TailedFile::open(&path, line_tx, Metrics::isolated(), false)
            .await
            .unwrap();
        let pathname = file.pathname().to_path_buf();

        let (event_tx, event_rx) = mpsc::channel(4);
        let task = tokio::spawn(run(file, event_rx));

        let mut log = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        log.write_all(b"first\nlast").unwrap();

        event_tx
            .send(ChangeEvent::new(ChangeKind::Create, tmp.path().join("other.log")))
            .await
            .unwrap();
        event_tx.send(ChangeEvent::update(&pathname)).await.unwrap();
        drop(event_tx);

        task.await.unwrap().unwrap();
        assert_eq!(line_rx.recv().await.unwrap().text, "first");
        assert_eq!(line_rx.recv().await.unwrap().text, "last");
        assert!(line_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_spawn_follower_tails_until_watcher_closes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.log");
        std::fs::write(&path, "").unwrap();
        let config = WatcherConfig {
            poll_interval: Duration::from_millis(10),
            enable_native: false,
            ..Default::default()
        };
        let watcher = LogWatcher::new(&config, Metrics::isolated()).unwrap();

        let (line_tx, mut line_rx) = mpsc::channel(4);
        let file = TailedFile::open(&path, line_tx, Metrics::isolated(), false)
            .await
            .unwrap();
        let task = spawn_follower(&watcher, file).unwrap();
        assert!(watcher.is_watching(&path));
        assert!(watcher.is_watching(tmp.path()));

        std::fs::write(&path, "hello\n").unwrap();
        let line = tokio::time::timeout(Duration::from_secs(5), line_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.text, "hello");

        watcher.close().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_spawn_follower_rejects_closed_watcher() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.log");
        std::fs::write(&path, "").unwrap();
        let config = WatcherConfig {
            enable_native: false,
            ..Default::default()
        };
        let watcher = LogWatcher::new(&config, Metrics::isolated()).unwrap();
        watcher.close().await;

        let (line_tx, mut line_rx) = mpsc::channel(1);
        let file = TailedFile::open(&path, line_tx, Metrics::isolated(), false)
            .await
            .unwrap();
        assert!(spawn_follower(&watcher, file).is_err());
        // The file was dropped, not handed to a task.
        assert!(line_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_stops_when_sink_closes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (line_tx, line_rx) = mpsc::channel(1);
        let file = TailedFile::open(&path, line_tx, Metrics::isolated(), false)
            .await
            .unwrap();
        let pathname = file.pathname().to_path_buf();
        drop(line_rx);

        std::fs::write(&path, "line\n").unwrap();
        let (event_tx, event_rx) = mpsc::channel(4);
        event_tx.send(ChangeEvent::update(&pathname)).await.unwrap();

        let err = run(file, event_rx).await.unwrap_err();
        assert!(is_sink_closed(&err));
    }
}
