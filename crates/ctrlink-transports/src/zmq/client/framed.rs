// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ REQ with a status-framed reply protocol
//!
//! A request is one or more frames. The reply starts with a status frame:
//!
//! - `t` followed by any number of payload frames: success, the payload frames
//!   are returned
//! - `f` followed by exactly one frame: the peer failed and the frame holds
//!   its message
//!
//! Anything else is a protocol violation ([`ErrorCode::InvalidState`]).
//!
//! The whole exchange shares one deadline. Once a request has left, any
//! failure rebuilds the socket so the next exchange starts clean.
//!
//! [`ErrorCode::InvalidState`]: crate::common::ErrorCode::InvalidState

use crate::common::{ClientConfig, Endpoint, TransportError, TransportResult};
use crate::traits::Transport;
use crate::zmq::lifecycle::{SocketLifecycle, SocketRole};
use crate::zmq::poll_millis;
use ctrlink_observability::{SharedLogSink, TracingSink};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

const STATUS_OK: &[u8] = b"t";
const STATUS_FAILED: &[u8] = b"f";

/// REQ client speaking the status-framed protocol
pub struct ZmqFramedReq {
    config: ClientConfig,
    lifecycle: Mutex<SocketLifecycle>,
    shared_context: Option<zmq::Context>,
    sink: SharedLogSink,
}

impl ZmqFramedReq {
    pub fn new(config: ClientConfig) -> TransportResult<Self> {
        config.validate()?;
        let sink = TracingSink::shared(SocketRole::Req.tag());
        Ok(Self {
            lifecycle: Mutex::new(Self::lifecycle_for(&config, sink.clone())),
            config,
            shared_context: None,
            sink,
        })
    }

    pub fn with_endpoint(host: impl Into<String>, port: u16) -> TransportResult<Self> {
        Self::new(ClientConfig::new(Endpoint::new(host, port)))
    }

    pub fn with_context(mut self, context: zmq::Context) -> Self {
        self.shared_context = Some(context);
        self
    }

    pub fn with_sink(mut self, sink: SharedLogSink) -> Self {
        self.lifecycle = Mutex::new(Self::lifecycle_for(&self.config, sink.clone()));
        self.sink = sink;
        self
    }

    fn lifecycle_for(config: &ClientConfig, sink: SharedLogSink) -> SocketLifecycle {
        SocketLifecycle::new(
            SocketRole::Req,
            config.endpoint.clone(),
            config.options.clone(),
            sink,
        )
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    pub fn initialize(&self, context: Option<&zmq::Context>) -> TransportResult<()> {
        self.lifecycle.lock().initialize(context)
    }

    pub fn destroy(&self) {
        self.lifecycle.lock().destroy();
    }

    pub fn reinitialize(&self) -> TransportResult<()> {
        self.lifecycle.lock().reinitialize()
    }

    /// Send `frames` as one multipart request and return the reply's payload frames
    ///
    /// `timeout` bounds the whole exchange, waiting for the socket to accept
    /// the request included. A zero timeout only succeeds if the reply is
    /// already there.
    pub fn send_and_receive(
        &self,
        frames: &[&[u8]],
        timeout: Duration,
    ) -> TransportResult<Vec<Vec<u8>>> {
        if frames.is_empty() {
            return Err(TransportError::InvalidArguments(
                "given messages is empty".to_string(),
            ));
        }

        let mut lifecycle = self.lifecycle.lock();
        let deadline = Instant::now().checked_add(timeout);

        let writable = wait_for(lifecycle.socket()?, zmq::POLLOUT, deadline)
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", lifecycle.endpoint(), e)))?;
        if !writable {
            return Err(TransportError::ExchangeTimeout {
                phase: "send request",
                timeout,
            });
        }

        let result = self.exchange(&lifecycle, frames, deadline, timeout);
        match result {
            Ok(reply) => split_status(reply),
            Err(e) => {
                self.sink.error(&format!("Exchange with {} failed: {}", lifecycle.endpoint(), e));
                self.sink.info("Re-creating zmq socket");
                if let Err(rebuild) = lifecycle.reinitialize() {
                    self.sink.error(&format!("Failed to re-create zmq socket: {}", rebuild));
                }
                Err(e)
            }
        }
    }

    /// Send without blocking, then wait for and read the whole reply
    fn exchange(
        &self,
        lifecycle: &SocketLifecycle,
        frames: &[&[u8]],
        deadline: Option<Instant>,
        timeout: Duration,
    ) -> TransportResult<Vec<Vec<u8>>> {
        let socket = lifecycle.socket()?;

        let last = frames.len() - 1;
        for (index, frame) in frames.iter().enumerate() {
            let flags = if index == last {
                zmq::DONTWAIT
            } else {
                zmq::DONTWAIT | zmq::SNDMORE
            };
            socket.send(*frame, flags).map_err(|e| {
                TransportError::InvalidState(format!("unable to send zmq message: {}", e))
            })?;
        }

        if deadline.is_some_and(|at| Instant::now() > at) {
            return Err(TransportError::ExchangeTimeout {
                phase: "send request",
                timeout,
            });
        }

        let readable = wait_for(socket, zmq::POLLIN, deadline)
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        if !readable {
            return Err(TransportError::ExchangeTimeout {
                phase: "receive response",
                timeout,
            });
        }

        socket.recv_multipart(zmq::DONTWAIT).map_err(|e| {
            TransportError::InvalidState(format!("unable to receive zmq message: {}", e))
        })
    }
}

/// Poll until `events` are ready or `deadline` passes; no deadline waits forever
fn wait_for(
    socket: &zmq::Socket,
    events: zmq::PollEvents,
    deadline: Option<Instant>,
) -> zmq::Result<bool> {
    loop {
        let wait_ms = match deadline {
            Some(at) => poll_millis(at.saturating_duration_since(Instant::now())),
            None => -1,
        };
        match socket.poll(events, wait_ms) {
            Ok(ready) => return Ok(ready > 0),
            Err(zmq::Error::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Check the status frame and strip it
fn split_status(mut reply: Vec<Vec<u8>>) -> TransportResult<Vec<Vec<u8>>> {
    let status = reply.first().map(|frame| frame.as_slice());
    if status == Some(STATUS_OK) {
        reply.remove(0);
        return Ok(reply);
    }
    if status == Some(STATUS_FAILED) {
        if reply.len() != 2 {
            return Err(TransportError::InvalidState(format!(
                "unexpected number of frames in error: {}",
                reply.len()
            )));
        }
        return Err(TransportError::PeerError(
            String::from_utf8_lossy(&reply[1]).into_owned(),
        ));
    }
    Err(TransportError::InvalidState(
        "unexpected response protocol".to_string(),
    ))
}

impl Transport for ZmqFramedReq {
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
        "zmq-req-framed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    fn frames(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_status_ok_strips_status() {
        let payload = split_status(frames(&["t", "a", "b"])).unwrap();
        assert_eq!(payload, frames(&["a", "b"]));

        assert!(split_status(frames(&["t"])).unwrap().is_empty());
    }

    #[test]
    fn test_status_failed_carries_peer_message() {
        let err = split_status(frames(&["f", "robot is busy"])).unwrap_err();
        assert!(matches!(&err, TransportError::PeerError(msg) if msg == "robot is busy"));
        assert_eq!(err.code(), ErrorCode::CommandFailed);
    }

    #[test]
    fn test_malformed_status_is_invalid_state() {
        let err = split_status(frames(&["f", "a", "b"])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
        assert!(err.to_string().contains("unexpected number of frames"));

        let err = split_status(frames(&["ok", "a"])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
        assert!(err.to_string().contains("unexpected response protocol"));

        let err = split_status(Vec::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }

    #[test]
    fn test_empty_request_rejected() {
        let mut req = ZmqFramedReq::with_endpoint("127.0.0.1", 31140).unwrap();
        req.start().unwrap();

        let err = req.send_and_receive(&[], Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArguments);
    }

    #[test]
    fn test_exchange_before_start() {
        let req = ZmqFramedReq::with_endpoint("127.0.0.1", 31141).unwrap();
        let err = req
            .send_and_receive(&[b"ping".as_slice()], Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotInitialized);
    }
}
