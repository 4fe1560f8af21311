// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for ctrlink
//!
//! Console output is always installed. With the `file-logging` feature a
//! timestamped run folder receives a daily-rotated copy of every line.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

#[cfg(feature = "file-logging")]
use std::path::{Path, PathBuf};

/// Build the env filter for the given flags
///
/// `RUST_LOG`, when set, wins over the flags.
pub fn build_filter(debug_flags: &CrateDebugFlags, base_level: &str) -> Result<EnvFilter> {
    if let Ok(directives) = std::env::var("RUST_LOG") {
        if !directives.trim().is_empty() {
            return EnvFilter::try_new(&directives)
                .map_err(|e| anyhow!("Invalid RUST_LOG directives '{}': {}", directives, e));
        }
    }
    let filter = debug_flags.to_filter_string(base_level);
    EnvFilter::try_new(&filter).map_err(|e| anyhow!("Invalid log filter '{}': {}", filter, e))
}

/// Initialize console logging
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, base_level: &str) -> Result<()> {
    let env_filter = build_filter(debug_flags, base_level)?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(env_filter);

    Registry::default()
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}

/// Initialize logging at `info` with flags taken from argv and `CTRLINK_DEBUG`
pub fn init_logging_default() -> Result<()> {
    init_logging(&crate::cli::parse_debug_flags(), "info")
}

/// Keeps the non-blocking file writer alive; logs are flushed on drop
#[cfg(feature = "file-logging")]
pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
    log_dir: PathBuf,
}

#[cfg(feature = "file-logging")]
impl LoggingGuard {
    /// Get the run folder path
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Initialize console logging plus a rolling file under `<base>/run_<timestamp>/ctrlink.log`
#[cfg(feature = "file-logging")]
pub fn init_logging_with_file(
    debug_flags: &CrateDebugFlags,
    base_level: &str,
    log_dir: Option<PathBuf>,
) -> Result<LoggingGuard> {
    use anyhow::Context;
    use tracing_appender::rolling;

    let base_log_dir = log_dir.unwrap_or_else(|| PathBuf::from("./logs"));
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_folder = base_log_dir.join(format!("run_{}", timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(build_filter(debug_flags, base_level)?);

    let (non_blocking, guard) =
        tracing_appender::non_blocking(rolling::daily(&run_folder, "ctrlink.log"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_filter(build_filter(debug_flags, base_level)?);

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(LoggingGuard {
        _file_guard: guard,
        log_dir: run_folder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_from_flags() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let flags = CrateDebugFlags::from_args(vec!["--debug-ctrlink-session".to_string()]);
        let filter = build_filter(&flags, "info").unwrap();
        assert!(filter.to_string().contains("ctrlink_session=debug"));
    }

    #[test]
    fn test_second_init_fails() {
        let flags = CrateDebugFlags::default();
        let _ = init_logging(&flags, "info");
        assert!(init_logging(&flags, "info").is_err());
    }
}
