// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ctrlink-observability
//!
//! Logging infrastructure shared by every ctrlink crate.
//!
//! - [`cli`]: per-crate debug flags (`--debug-ctrlink-transports`, `--debug-all`,
//!   `CTRLINK_DEBUG=...`)
//! - [`init`]: installs the `tracing` subscriber
//! - [`sink`]: the [`LogSink`] capability handed to transport roles so the
//!   lines they emit can be redirected or captured
//!
//! ## Features
//! - `file-logging`: daily rolling log file next to the console output

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;
pub mod sink;

pub use cli::*;
pub use init::*;
pub use sink::{LogSink, RecordingSink, SharedLogSink, TracingSink};

/// Known ctrlink crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "ctrlink",
    "ctrlink-config",
    "ctrlink-observability",
    "ctrlink-transports",
    "ctrlink-session",
];

/// Truncate a payload for inclusion in a log line.
///
/// Commands sent to the controller can be megabytes of JSON; only the first
/// `MAX_LOGGED_PAYLOAD` bytes are echoed, followed by `...`.
pub fn truncate_for_log(payload: &str) -> String {
    if payload.len() <= MAX_LOGGED_PAYLOAD {
        return payload.to_string();
    }
    let mut cut = MAX_LOGGED_PAYLOAD;
    while !payload.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &payload[..cut])
}

/// Longest payload prefix echoed by [`truncate_for_log`]
pub const MAX_LOGGED_PAYLOAD: usize = 1000;
