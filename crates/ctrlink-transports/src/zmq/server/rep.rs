// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ REP pattern (server-side request-reply)
//!
//! Answers one request at a time. There is no recovery here: a failed send
//! means the peer broke the request/reply protocol and is reported as is.

use crate::common::{ServerConfig, TransportError, TransportResult};
use crate::traits::{ReplyServer, Transport};
use crate::zmq::lifecycle::{SocketLifecycle, SocketRole};
use crate::zmq::{poll_readable, recv_message};
use ctrlink_observability::{SharedLogSink, TracingSink};
use parking_lot::Mutex;
use std::time::Duration;

/// ZMQ REP socket implementation (server-side)
pub struct ZmqRep {
    config: ServerConfig,
    lifecycle: Mutex<SocketLifecycle>,
    shared_context: Option<zmq::Context>,
}

impl ZmqRep {
    /// Create a new REP socket
    pub fn new(config: ServerConfig) -> TransportResult<Self> {
        config.validate()?;
        let sink = TracingSink::shared(SocketRole::Rep.tag());
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
            SocketRole::Rep,
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

    /// Receive a pending request
    ///
    /// With `timeout` `None` this never blocks; otherwise it waits up to
    /// `timeout`. `Ok(None)` means nothing was pending.
    pub fn recv(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<u8>>> {
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

    /// Reply to the most recently received request
    pub fn send(&self, data: &[u8]) -> TransportResult<()> {
        let lifecycle = self.lifecycle.lock();
        lifecycle
            .socket()?
            .send(data, 0)
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", lifecycle.address(), e)))
    }

    /// Receive a pending request keeping its frames apart
    ///
    /// Same waiting rules as [`recv`](Self::recv).
    pub fn recv_frames(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<Vec<u8>>>> {
        let lifecycle = self.lifecycle.lock();
        let socket = lifecycle.socket()?;

        if let Some(wait) = timeout {
            let ready = poll_readable(socket, wait)
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
            if !ready {
                return Ok(None);
            }
        }

        match socket.recv_multipart(zmq::DONTWAIT) {
            Ok(frames) => Ok(Some(frames)),
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }

    /// Reply with a multipart message
    pub fn send_frames(&self, frames: &[&[u8]]) -> TransportResult<()> {
        if frames.is_empty() {
            return Err(TransportError::InvalidArguments("reply has no frames".to_string()));
        }
        let lifecycle = self.lifecycle.lock();
        lifecycle
            .socket()?
            .send_multipart(frames.iter().copied(), 0)
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", lifecycle.address(), e)))
    }

    /// Wait up to `timeout` for a request without consuming it
    pub fn poll(&self, timeout: Duration) -> TransportResult<bool> {
        let lifecycle = self.lifecycle.lock();
        poll_readable(lifecycle.socket()?, timeout)
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))
    }
}

impl Transport for ZmqRep {
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
        "zmq-rep"
    }
}

impl ReplyServer for ZmqRep {
    fn receive(&self, timeout: Option<Duration>) -> TransportResult<Option<Vec<u8>>> {
        self.recv(timeout)
    }

    fn reply(&self, data: &[u8]) -> TransportResult<()> {
        self.send(data)
    }

    fn poll(&self, timeout: Duration) -> TransportResult<bool> {
        ZmqRep::poll(self, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rep_creation() {
        assert!(ZmqRep::with_port(31130).is_ok());
        assert!(ZmqRep::with_port(0).is_err());
    }

    #[test]
    fn test_rep_start_stop() {
        let mut rep = ZmqRep::with_port(31131).unwrap();
        assert!(!rep.is_running());

        rep.start().unwrap();
        assert!(rep.is_running());

        rep.stop().unwrap();
        assert!(!rep.is_running());
    }

    #[test]
    fn test_recv_nothing_pending() {
        let mut rep = ZmqRep::with_port(31132).unwrap();
        rep.start().unwrap();

        assert_eq!(rep.recv(None).unwrap(), None);
        assert_eq!(rep.recv(Some(Duration::from_millis(20))).unwrap(), None);
        assert!(!rep.poll(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_send_without_request_is_error() {
        let mut rep = ZmqRep::with_port(31133).unwrap();
        rep.start().unwrap();

        let err = rep.send(b"orphan").unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
    }

    #[test]
    fn test_frames_nothing_pending() {
        let mut rep = ZmqRep::with_port(31134).unwrap();
        rep.start().unwrap();

        assert_eq!(rep.recv_frames(Some(Duration::from_millis(20))).unwrap(), None);
        let err = rep.send_frames(&[]).unwrap_err();
        assert!(matches!(err, TransportError::InvalidArguments(_)));
    }
}
