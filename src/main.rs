//! logtail - follow log files across rotation and truncation
//!
//! Entry point for the logtail command-line driver.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use logtail::tailer::{self, LogLine, TailedFile};
use logtail::telemetry::{global_metrics, init_tracing, Metrics};
use logtail::watcher::LogWatcher;
use logtail::{Config, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lines buffered between the tailers and stdout.
const LINE_QUEUE_CAPACITY: usize = 1024;

/// logtail - follow log files across rotation and truncation
#[derive(Parser, Debug)]
#[command(name = "logtail")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file, overridden by environment and flags
    #[arg(short, long, env = "LOGTAIL_CONFIG")]
    config: Option<PathBuf>,

    /// Log files or named pipes to tail
    #[arg(env = "LOGTAIL_PATHS", value_delimiter = ',')]
    paths: Vec<PathBuf>,

    /// Poll interval in milliseconds (0 relies on native notifications)
    #[arg(long, env = "LOGTAIL_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Disable OS change notifications and poll only
    #[arg(long, env = "LOGTAIL_NO_NATIVE")]
    no_native: bool,

    /// Directories that never receive a native watch
    #[arg(long = "excluded-dir", env = "LOGTAIL_EXCLUDED_DIRS", value_delimiter = ',')]
    excluded_dirs: Vec<PathBuf>,

    /// Read each file once from the start and exit
    #[arg(long, env = "LOGTAIL_ONE_SHOT")]
    one_shot: bool,

    /// Start at the beginning of existing files instead of the end
    #[arg(long, env = "LOGTAIL_FROM_START")]
    from_start: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOGTAIL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging output
    #[arg(long, env = "LOGTAIL_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    /// Layer flags and environment over the configuration file.
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if !self.paths.is_empty() {
            config.paths = self.paths;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if self.no_native {
            config.enable_native = false;
        }
        if !self.excluded_dirs.is_empty() {
            config.excluded_dirs = self.excluded_dirs;
        }
        config.one_shot |= self.one_shot;
        config.from_start |= self.from_start;
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.log_json |= self.log_json;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;

    init_tracing(&config.log_level, config.log_json);

    tracing::info!("logtail v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "Configuration loaded");

    config.validate()?;

    let metrics = global_metrics()?;

    let (lines, mut line_rx) = mpsc::channel::<LogLine>(LINE_QUEUE_CAPACITY);
    let printer = tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            println!("{}\t{}", line.source, line.text);
        }
    });

    if config.one_shot {
        let read = tailer::one_shot(&config.paths, lines, Arc::clone(&metrics)).await;
        tracing::info!(files = read, total = config.paths.len(), "Finished reading");
    } else {
        follow(&config, lines, Arc::clone(&metrics)).await?;
    }

    if let Err(e) = printer.await {
        tracing::error!(error = %e, "Line printer failed");
    }

    match metrics.encode_text() {
        Ok(text) => tracing::info!("Final counters:\n{text}"),
        Err(e) => tracing::warn!(error = %e, "Failed to encode counters"),
    }

    tracing::info!("logtail stopped");
    Ok(())
}

/// Tail every configured path until interrupted.
async fn follow(config: &Config, lines: mpsc::Sender<LogLine>, metrics: Arc<Metrics>) -> Result<()> {
    let watcher = LogWatcher::new(&config.watcher_config(), Arc::clone(&metrics))?;
    let mut tailers: Vec<JoinHandle<Result<()>>> = Vec::new();

    for path in &config.paths {
        let file = match TailedFile::open(
            path,
            lines.clone(),
            Arc::clone(&metrics),
            config.from_start,
        )
        .await
        {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping log file");
                continue;
            }
        };

        match tailer::spawn_follower(&watcher, file) {
            Ok(task) => tailers.push(task),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unwatchable log file");
            }
        }
    }
    drop(lines);

    if tailers.is_empty() {
        watcher.close().await;
        return Err(logtail::Error::config("no log file could be opened"));
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
    watcher.close().await;

    for tailer in tailers {
        match tailer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Tailer stopped with error"),
            Err(e) => tracing::error!(error = %e, "Tailer task failed"),
        }
    }
    Ok(())
}
