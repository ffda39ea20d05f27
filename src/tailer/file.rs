//! Tailed-file state machine.
//!
//! A [`TailedFile`] follows one path across appends, rotations and in-place
//! truncations. The caller drives it by calling [`TailedFile::follow`] once
//! per change event for its path.

use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::line::{LineBuffer, LogLine};
use super::source::{same_file, Source};
use crate::error::TailerError;
use crate::telemetry::Metrics;
use crate::watcher::absolute_path;
use crate::{Error, Result};

/// Bytes requested per read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Extra open attempts after a rotation.
const OPEN_RETRIES: u32 = 3;

/// Delay before the first retry; doubled on each one.
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// A log file being followed.
#[derive(Debug)]
pub struct TailedFile {
    name: String,
    pathname: PathBuf,
    last_read: DateTime<Utc>,
    source: Source,
    buffer: LineBuffer,
    lines: mpsc::Sender<LogLine>,
    metrics: Arc<Metrics>,
}

impl TailedFile {
    /// Open `path` for tailing.
    ///
    /// Regular files are positioned at end-of-file unless `seek_to_start` is
    /// set. Named pipes are never seeked.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened, is neither a regular
    /// file nor a named pipe, or the initial seek fails.
    pub async fn open(
        path: impl AsRef<Path>,
        lines: mpsc::Sender<LogLine>,
        metrics: Arc<Metrics>,
        seek_to_start: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let pathname = absolute_path(path).map_err(|e| TailerError::open(&name, &e))?;

        let mut source = open_source(&pathname, &name, &metrics, false).await?;
        if source.is_regular() && !seek_to_start {
            source
                .seek(SeekFrom::End(0))
                .await
                .map_err(|e| TailerError::Seek {
                    path: name.clone(),
                    reason: e.to_string(),
                })?;
        }

        tracing::debug!(name = %name, path = %pathname.display(), seek_to_start, "Opened log file");

        Ok(Self {
            name,
            pathname,
            last_read: Utc::now(),
            source,
            buffer: LineBuffer::new(),
            lines,
            metrics,
        })
    }

    /// Name the file was opened with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path being followed.
    #[must_use]
    pub fn pathname(&self) -> &Path {
        &self.pathname
    }

    /// Time of the last read pass that returned data.
    #[must_use]
    pub const fn last_read(&self) -> DateTime<Utc> {
        self.last_read
    }

    /// Whether the open descriptor is a regular file rather than a pipe.
    #[must_use]
    pub const fn is_regular(&self) -> bool {
        self.source.is_regular()
    }

    /// Stat the open descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be stat'd.
    pub async fn metadata(&self) -> Result<Metadata> {
        self.source
            .metadata()
            .await
            .map_err(|e| TailerError::stat(&self.name, &e).into())
    }

    /// Handle one change notification for this path.
    ///
    /// Detects rotation by comparing the open descriptor with the path, then
    /// reads whatever is new.
    ///
    /// # Errors
    ///
    /// Returns an error if a rotated file cannot be reopened, a read fails, or
    /// the line sink is closed.
    pub async fn follow(&mut self) -> Result<()> {
        match self.source.metadata().await {
            Err(e) => {
                tracing::info!(name = %self.name, error = %e, "Stat failed on open descriptor, treating as rotation");
                self.rotate().await?;
            }
            Ok(open) => match tokio::fs::metadata(&self.pathname).await {
                Err(e) => {
                    tracing::debug!(path = %self.pathname.display(), error = %e, "Stat failed on path");
                    return Ok(());
                }
                Ok(current) if !same_file(&open, &current) => {
                    tracing::info!(path = %self.pathname.display(), "New inode detected, treating as rotation");
                    self.rotate().await?;
                }
                Ok(_) => {
                    tracing::trace!(path = %self.pathname.display(), "Inode unchanged");
                }
            },
        }
        self.read().await.map(|_| ())
    }

    /// Drain the old descriptor and swap in the file now at the path.
    async fn rotate(&mut self) -> Result<()> {
        match self.read().await {
            Err(e) if is_sink_closed(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(name = %self.name, error = %e, "Failed to drain rotated file");
            }
            Ok(_) => {}
        }
        self.metrics.inc_rotation(&self.name);
        self.source = open_source(&self.pathname, &self.name, &self.metrics, true).await?;
        tracing::info!(name = %self.name, "Reopened rotated file");
        Ok(())
    }

    /// Read until end-of-stream, emitting every completed line.
    ///
    /// Returns the number of bytes read in this pass. A read that outlives
    /// [`READ_DEADLINE`](super::READ_DEADLINE) ends the pass like end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns an error for any read failure other than end-of-stream, or if
    /// the line sink is closed.
    pub async fn read(&mut self) -> Result<u64> {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut total: u64 = 0;

        let outcome: Result<()> = 'pass: loop {
            let n = match self.source.read(&mut buf).await {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    tracing::trace!(name = %self.name, "Read deadline reached");
                    break Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.metrics.inc_log_error(&self.name);
                    break Err(TailerError::Read {
                        path: self.name.clone(),
                        source: e,
                    }
                    .into());
                }
            };

            if n == 0 {
                if total == 0 && self.source.is_regular() && self.check_for_truncate().await? {
                    continue;
                }
                break Ok(());
            }

            total += n as u64;
            for line in self.buffer.feed(&buf[..n]) {
                if let Err(e) = self.send_line(line).await {
                    break 'pass Err(e);
                }
            }
        };

        if total > 0 {
            self.last_read = Utc::now();
        }
        outcome.map(|()| total)
    }

    /// Rewind if the file shrank below the read offset.
    ///
    /// Stat and seek failures are logged and count as not truncated.
    async fn check_for_truncate(&mut self) -> Result<bool> {
        let offset = match self.source.position().await {
            Ok(offset) => offset,
            Err(e) => {
                tracing::debug!(name = %self.name, error = %e, "Can't read offset");
                return Ok(false);
            }
        };
        let size = match self.source.metadata().await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::debug!(name = %self.name, error = %e, "Can't stat open descriptor");
                return Ok(false);
            }
        };

        if offset == 0 || size >= offset {
            return Ok(false);
        }

        tracing::info!(name = %self.name, offset, size, "File truncated, seeking to start");
        // The partial line belongs to the old content.
        self.flush_partial().await?;
        if let Err(e) = self.source.seek(SeekFrom::Start(0)).await {
            tracing::warn!(name = %self.name, error = %e, "Seek after truncation failed");
            return Ok(false);
        }
        self.metrics.inc_truncation(&self.name);
        Ok(true)
    }

    async fn send_line(&self, text: String) -> Result<()> {
        self.lines
            .send(LogLine::new(self.name.clone(), text))
            .await
            .map_err(|_| TailerError::SinkClosed(self.name.clone()))?;
        self.metrics.inc_line(&self.name);
        Ok(())
    }

    async fn flush_partial(&mut self) -> Result<()> {
        match self.buffer.take_partial() {
            Some(text) => self.send_line(text).await,
            None => Ok(()),
        }
    }

    /// Emit any unterminated trailing line and close the descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the line sink is closed while a partial line is
    /// still buffered.
    pub async fn close(mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.flush_partial().await?;
        }
        tracing::debug!(name = %self.name, "Closed log file");
        Ok(())
    }
}

/// Whether `err` means the consumer of tailed lines has gone away.
#[must_use]
pub fn is_sink_closed(err: &Error) -> bool {
    matches!(err, Error::Tailer(TailerError::SinkClosed(_)))
}

/// Open `pathname`, retrying with backoff when `retry` is set.
///
/// Every failed attempt is counted against `name`. Unsupported file types
/// are never retried.
async fn open_source(
    pathname: &Path,
    name: &str,
    metrics: &Metrics,
    retry: bool,
) -> std::result::Result<Source, TailerError> {
    let retries = if retry { OPEN_RETRIES } else { 0 };
    let mut delay = OPEN_RETRY_DELAY;
    let mut attempt = 0;

    loop {
        match Source::open(pathname).await {
            Ok(source) => return Ok(source),
            Err(e) => {
                metrics.inc_log_error(name);
                if attempt >= retries || matches!(e, TailerError::UnsupportedFileType { .. }) {
                    return Err(e);
                }
                attempt += 1;
                tracing::debug!(path = %pathname.display(), error = %e, attempt, "Open failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}
