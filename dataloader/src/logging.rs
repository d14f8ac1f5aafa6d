//! Tracing subscriber setup for binaries and embedders.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! the caller's choice.

use dataloader_shared::{LoaderError, LoaderResult};
use serde::Deserialize;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const LOG_FILE_PREFIX: &str = "dataloader.log";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Also write logs to a daily-rotated file in this directory.
    pub log_dir: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            log_dir: None,
            ansi: true,
        }
    }
}

impl LoggingOptions {
    fn filter(&self) -> LoaderResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_filter).map_err(|e| {
                LoaderError::Config(format!(
                    "invalid log filter '{}': {}",
                    self.default_filter, e
                ))
            }),
        }
    }
}

/// Install the global subscriber.
///
/// Logs go to stderr, and to `log_dir` when set. The returned guard flushes the
/// file writer on drop and must be held for the life of the process.
pub fn init_logging(options: &LoggingOptions) -> LoaderResult<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(options.ansi)
        .with_target(true);

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                LoaderError::Config(format!(
                    "failed to create log directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(options.filter()?)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoaderError::Internal(format!("failed to install subscriber: {}", e)))?;

    Ok(guard)
}
