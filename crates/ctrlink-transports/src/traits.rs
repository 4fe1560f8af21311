// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transport trait definitions
//!
//! These traits define the common interface of the four messaging roles.

use crate::common::TransportResult;
use std::time::Duration;

/// Base transport trait - implemented by all transports
pub trait Transport: Send + Sync {
    /// Create the socket and connect/bind it
    fn start(&mut self) -> TransportResult<()>;

    /// Tear the socket down; safe to call repeatedly
    fn stop(&mut self) -> TransportResult<()>;

    /// Check if transport is running
    fn is_running(&self) -> bool;

    /// Get transport name/type
    fn transport_type(&self) -> &str;
}

/// Request-Reply pattern (Client side)
///
/// One outstanding request at a time; every request gets exactly one reply
/// or an error.
pub trait RequestReplyClient: Transport {
    /// Send a request and wait for the reply with the configured default deadline
    fn request(&self, data: &[u8]) -> TransportResult<Vec<u8>>;

    /// Send a request and wait up to `timeout` (None = forever)
    fn request_timeout(&self, data: &[u8], timeout: Option<Duration>) -> TransportResult<Vec<u8>>;
}

/// Request-Reply pattern (Server side)
///
/// Every received request must be answered with [`reply`](ReplyServer::reply)
/// before the next one can be received.
pub trait ReplyServer: Transport {
    /// Receive a pending request; `None` timeout returns immediately
    fn receive(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<u8>>>;

    /// Answer the most recently received request
    fn reply(&self, data: &[u8]) -> TransportResult<()>;

    /// Wait up to `timeout` for a request without consuming it
    fn poll(&self, timeout: Duration) -> TransportResult<bool>;
}

/// Publish-Subscribe pattern (Publisher side)
pub trait Publisher: Transport {
    /// Broadcast without blocking; `false` means the message was dropped
    fn publish(&self, data: &[u8]) -> TransportResult<bool>;
}

/// Publish-Subscribe pattern (Subscriber side)
pub trait Subscriber: Transport {
    /// Next message, waiting up to `timeout` (None = non-blocking)
    fn receive(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<u8>>>;

    /// Newest queued message, discarding older ones
    fn receive_latest(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<u8>>>;
}
