// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Injectable logging capability
//!
//! Transport roles never reach for a global logger directly. Each one holds a
//! [`SharedLogSink`], defaulting to [`TracingSink`], so callers can route the
//! diagnostics of a single socket elsewhere (or capture them in tests).

use parking_lot::Mutex;
use std::sync::Arc;

/// Destination for informational and error lines emitted by a component
pub trait LogSink: Send + Sync {
    /// Informational line (socket bound, socket recreated, ...)
    fn info(&self, message: &str);

    /// Error line (send failed, timed out, ...)
    fn error(&self, message: &str);
}

/// Shared handle to a sink
pub type SharedLogSink = Arc<dyn LogSink>;

/// Sink forwarding to `tracing`
#[derive(Debug, Clone)]
pub struct TracingSink {
    component: &'static str,
}

impl TracingSink {
    /// Create a sink tagging every line with `component` (e.g. `"ZMQ-REQ"`)
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    /// Shared handle, ready to hand to a transport role
    pub fn shared(component: &'static str) -> SharedLogSink {
        Arc::new(Self::new(component))
    }
}

impl LogSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!("[{}] {}", self.component, message);
    }

    fn error(&self, message: &str) {
        tracing::error!("[{}] {}", self.component, message);
    }
}

/// Severity of a captured line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedLevel {
    Info,
    Error,
}

/// Sink keeping every line in memory
///
/// Used to assert that self-healing events (socket recreation) were reported.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(RecordedLevel, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all recorded lines
    pub fn lines(&self) -> Vec<(RecordedLevel, String)> {
        self.lines.lock().clone()
    }

    /// Number of recorded lines containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|(_, line)| line.contains(needle))
            .count()
    }
}

impl LogSink for RecordingSink {
    fn info(&self, message: &str) {
        self.lines.lock().push((RecordedLevel::Info, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.lines.lock().push((RecordedLevel::Error, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_captures_levels() {
        let sink = RecordingSink::new();
        sink.info("re-creating zmq socket");
        sink.error("failed to send request");

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, RecordedLevel::Info);
        assert_eq!(lines[1].0, RecordedLevel::Error);
        assert_eq!(sink.count_containing("re-creating"), 1);
    }

    #[test]
    fn test_tracing_sink_is_object_safe() {
        let sink: SharedLogSink = TracingSink::shared("ZMQ-REQ");
        sink.info("connecting");
        sink.error("no subscriber installed, line is dropped");
    }
}
