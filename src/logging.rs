// ABOUTME: Tracing subscriber setup: env-filtered console output plus a daily log file
// ABOUTME: The returned guard must live for the whole process so buffered lines are flushed

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when RUST_LOG is unset
pub const DEFAULT_FILTER: &str = "info";

/// File name prefix for the rolling log; the date is appended per day
pub const LOG_FILE_PREFIX: &str = "debug.log";

/// Install the global subscriber.
///
/// Console output goes to stderr so command output on stdout stays clean.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
