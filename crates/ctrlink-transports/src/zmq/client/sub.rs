// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ SUB pattern (client-side publish-subscribe)
//!
//! Subscribes to every topic. Used to consume heartbeats, where only the
//! freshest message matters.

use crate::common::{ClientConfig, Endpoint, TransportError, TransportResult};
use crate::traits::{Subscriber, Transport};
use crate::zmq::lifecycle::{SocketLifecycle, SocketRole};
use crate::zmq::{poll_readable, recv_message};
use ctrlink_observability::{SharedLogSink, TracingSink};
use parking_lot::Mutex;
use std::time::Duration;

/// ZMQ SUB socket implementation (client-side)
pub struct ZmqSub {
    config: ClientConfig,
    lifecycle: Mutex<SocketLifecycle>,
    shared_context: Option<zmq::Context>,
}

impl ZmqSub {
    /// Create a new SUB socket
    pub fn new(config: ClientConfig) -> TransportResult<Self> {
        config.validate()?;
        let sink = TracingSink::shared(SocketRole::Sub.tag());
        Ok(Self {
            lifecycle: Mutex::new(Self::lifecycle_for(&config, sink)),
            config,
            shared_context: None,
        })
    }

    /// Create with default options
    pub fn with_endpoint(host: impl Into<String>, port: u16) -> TransportResult<Self> {
        Self::new(ClientConfig::new(Endpoint::new(host, port)))
    }

    /// Build the socket on a caller-owned context instead of a private one
    pub fn with_context(mut self, context: zmq::Context) -> Self {
        self.shared_context = Some(context);
        self
    }

    /// Route this subscriber's diagnostics to `sink`
    pub fn with_sink(mut self, sink: SharedLogSink) -> Self {
        self.lifecycle = Mutex::new(Self::lifecycle_for(&self.config, sink));
        self
    }

    fn lifecycle_for(config: &ClientConfig, sink: SharedLogSink) -> SocketLifecycle {
        SocketLifecycle::new(
            SocketRole::Sub,
            config.endpoint.clone(),
            config.options.clone(),
            sink,
        )
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    /// Create the socket, adopting `context` if given
    pub fn initialize(&self, context: Option<&zmq::Context>) -> TransportResult<()> {
        self.lifecycle.lock().initialize(context)
    }

    pub fn destroy(&self) {
        self.lifecycle.lock().destroy();
    }

    /// Replace the socket with a fresh subscription
    pub fn reinitialize(&self) -> TransportResult<()> {
        self.lifecycle.lock().reinitialize()
    }

    /// Next message, waiting up to `timeout` (None = non-blocking)
    pub fn receive(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<u8>>> {
        let lifecycle = self.lifecycle.lock();
        let socket = lifecycle.socket()?;

        if let Some(wait) = timeout {
            let ready = poll_readable(socket, wait)
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
            if !ready {
                return Ok(None);
            }
        }

        match recv_message(socket, zmq::DONTWAIT) {
            Ok(data) => Ok(Some(data)),
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }

    /// Wait up to `timeout` for one message, then drain the queue and return the newest
    pub fn receive_latest(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<u8>>> {
        let mut latest = match self.receive(timeout)? {
            Some(data) => data,
            None => return Ok(None),
        };

        let mut skipped = 0usize;
        while let Some(newer) = self.receive(None)? {
            latest = newer;
            skipped += 1;
        }
        if skipped > 0 {
            tracing::debug!("[ZMQ-SUB] Skipped {} stale messages from {}", skipped, self.config.endpoint);
        }

        Ok(Some(latest))
    }
}

impl Transport for ZmqSub {
    fn start(&mut self) -> TransportResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_initialized() {
            return Err(TransportError::AlreadyRunning);
        }
        lifecycle.initialize(self.shared_context.as_ref())
    }

    fn stop(&mut self) -> TransportResult<()> {
        self.lifecycle.lock().destroy();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.lifecycle.lock().is_initialized()
    }

    fn transport_type(&self) -> &str {
        "zmq-sub"
    }
}

impl Subscriber for ZmqSub {
    fn receive(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<u8>>> {
        ZmqSub::receive(self, timeout)
    }

    fn receive_latest(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<u8>>> {
        ZmqSub::receive_latest(self, timeout)
    }
}
