//! `tracing` subscriber setup for the `leadbox` binary.
//!
//! Commands print their results as JSON on stdout, so log output never goes
//! there. With a log directory (`--log-dir` or `[logging] dir`), events are
//! written as JSON lines to rotating `leadbox.*.log` files. Without one, only
//! warnings reach stderr.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogRotation, LoggingConfig};

/// File name prefix of every log file.
pub const LOG_FILE_PREFIX: &str = "leadbox";

/// Filter used by console mode when `RUST_LOG` is unset.
const CONSOLE_LEVEL: &str = "warn";

/// Keeps the background log writer alive. Dropping it flushes buffered
/// events, so hold it until the command finishes.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// `RUST_LOG` if set, otherwise `fallback`.
fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// The appender rotation for a configured period.
pub fn rotation(period: LogRotation) -> Rotation {
    match period {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Log JSON lines to rotating files under `dir`.
///
/// The directory and the first log file are created before the subscriber
/// is installed.
///
/// # Errors
///
/// Returns an error if the directory or log file cannot be created, or a
/// global subscriber is already installed.
pub fn init_file(dir: &Path, config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(rotation(config.rotation))
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("failed to open log file in {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter(&config.level))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard { _guard: guard })
}

/// Log human-readable warnings and errors to stderr.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_console() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(CONSOLE_LEVEL))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
