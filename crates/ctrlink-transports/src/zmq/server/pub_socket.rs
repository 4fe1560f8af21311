// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ PUB pattern (server-side publish-subscribe)
//!
//! The outbound queue is capped at the configured high water mark. Once it is
//! full, or when nobody is subscribed, messages are dropped and `publish`
//! returns immediately.

use crate::common::{ServerConfig, TransportError, TransportResult};
use crate::traits::{Publisher, Transport};
use crate::zmq::lifecycle::{SocketLifecycle, SocketRole};
use ctrlink_observability::{SharedLogSink, TracingSink};
use parking_lot::Mutex;

/// ZMQ PUB socket implementation (publisher)
pub struct ZmqPub {
    config: ServerConfig,
    lifecycle: Mutex<SocketLifecycle>,
    shared_context: Option<zmq::Context>,
}

impl ZmqPub {
    /// Create a new PUB socket
    pub fn new(config: ServerConfig) -> TransportResult<Self> {
        config.validate()?;
        let sink = TracingSink::shared(SocketRole::Pub.tag());
        Ok(Self {
            lifecycle: Mutex::new(Self::lifecycle_for(&config, sink)),
            config,
            shared_context: None,
        })
    }

    /// Create with default options, listening on all interfaces
    pub fn with_port(port: u16) -> TransportResult<Self> {
        Self::new(ServerConfig::new(port))
    }

    pub fn with_context(mut self, context: zmq::Context) -> Self {
        self.shared_context = Some(context);
        self
    }

    pub fn with_sink(mut self, sink: SharedLogSink) -> Self {
        self.lifecycle = Mutex::new(Self::lifecycle_for(&self.config, sink));
        self
    }

    fn lifecycle_for(config: &ServerConfig, sink: SharedLogSink) -> SocketLifecycle {
        SocketLifecycle::new(
            SocketRole::Pub,
            config.endpoint.clone(),
            config.options.clone(),
            sink,
        )
    }

    pub fn port(&self) -> u16 {
        self.config.endpoint.port
    }

    /// Create and bind the socket, adopting `context` if given
    pub fn initialize(&self, context: Option<&zmq::Context>) -> TransportResult<()> {
        self.lifecycle.lock().initialize(context)
    }

    pub fn destroy(&self) {
        self.lifecycle.lock().destroy();
    }

    /// Broadcast `data` without blocking
    ///
    /// Returns `Ok(false)` when the message was refused by a full queue.
    pub fn publish(&self, data: &[u8]) -> TransportResult<bool> {
        let lifecycle = self.lifecycle.lock();
        match lifecycle.socket()?.send(data, zmq::DONTWAIT) {
            Ok(()) => Ok(true),
            Err(zmq::Error::EAGAIN) => {
                tracing::debug!("[ZMQ-PUB] Queue full on {}, message dropped", lifecycle.address());
                Ok(false)
            }
            Err(e) => Err(TransportError::SendFailed(format!("{}: {}", lifecycle.address(), e))),
        }
    }
}

impl Transport for ZmqPub {
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
        "zmq-pub"
    }
}

impl Publisher for ZmqPub {
    fn publish(&self, data: &[u8]) -> TransportResult<bool> {
        ZmqPub::publish(self, data)
    }
}
