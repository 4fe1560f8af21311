// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ REQ pattern (client-side request-reply)
//!
//! A REQ socket strictly alternates send and receive. [`ZmqReq::call`] keeps
//! that alternation intact across failures:
//!
//! - a send refused by the socket (typically because an earlier call timed out
//!   and its reply was never read) recreates the socket and retries once;
//! - an error while waiting for the reply recreates the socket and fails the
//!   call, leaving a fresh socket for the next one;
//! - a timeout or preemption leaves the socket as is, and the next call takes
//!   the recreate-and-retry path above.

use crate::common::{
    ClientConfig, Endpoint, Preempt, SharedPreempt, TransportError, TransportResult,
};
use crate::traits::{RequestReplyClient, Transport};
use crate::zmq::lifecycle::{SocketLifecycle, SocketRole};
use crate::zmq::{poll_millis, readable, recv_message};
use ctrlink_observability::{truncate_for_log, SharedLogSink, TracingSink};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// ZMQ REQ socket implementation (client-side)
pub struct ZmqReq {
    config: ClientConfig,
    lifecycle: Mutex<SocketLifecycle>,
    shared_context: Option<zmq::Context>,
    preempt: Option<SharedPreempt>,
    sink: SharedLogSink,
    #[cfg(test)]
    faults: Mutex<tests::InjectedFaults>,
}

impl ZmqReq {
    /// Create a new REQ client; call [`start`](Transport::start) to connect
    pub fn new(config: ClientConfig) -> TransportResult<Self> {
        config.validate()?;
        let sink = TracingSink::shared(SocketRole::Req.tag());

        Ok(Self {
            lifecycle: Mutex::new(SocketLifecycle::new(
                SocketRole::Req,
                config.endpoint.clone(),
                config.options.clone(),
                sink.clone(),
            )),
            config,
            shared_context: None,
            preempt: None,
            sink,
            #[cfg(test)]
            faults: Mutex::new(tests::InjectedFaults::default()),
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

    /// Route this client's diagnostics to `sink`
    pub fn with_sink(mut self, sink: SharedLogSink) -> Self {
        self.lifecycle = Mutex::new(SocketLifecycle::new(
            SocketRole::Req,
            self.config.endpoint.clone(),
            self.config.options.clone(),
            sink.clone(),
        ));
        self.sink = sink;
        self
    }

    /// Install the cancellation source consulted while waiting for replies
    pub fn with_preempt(mut self, preempt: SharedPreempt) -> Self {
        self.preempt = Some(preempt);
        self
    }

    pub fn set_preempt(&mut self, preempt: Option<SharedPreempt>) {
        self.preempt = preempt;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    /// Create the socket, adopting `context` if given
    ///
    /// An already live socket is destroyed first.
    pub fn initialize(&self, context: Option<&zmq::Context>) -> TransportResult<()> {
        self.lifecycle.lock().initialize(context)
    }

    /// Close the socket and release a privately owned context
    pub fn destroy(&self) {
        self.lifecycle.lock().destroy();
    }

    /// Replace the socket with a fresh one connected to the same endpoint
    pub fn reinitialize(&self) -> TransportResult<()> {
        self.lifecycle.lock().reinitialize()
    }

    /// Send `message` and wait for the reply
    ///
    /// * `timeout` - `None` waits forever (the call may never return if the
    ///   peer is gone)
    /// * `preempt_bits` - bits checked against the installed preemption source
    ///   between poll slices; `0` disables the check
    pub fn call(
        &self,
        message: &str,
        timeout: Option<Duration>,
        preempt_bits: u32,
    ) -> TransportResult<String> {
        let reply = self.call_bytes(message.as_bytes(), timeout, preempt_bits)?;
        String::from_utf8(reply)
            .map_err(|e| TransportError::InvalidMessage(format!("reply is not UTF-8: {}", e)))
    }

    /// [`call`](Self::call) with the configured default deadline and no preemption
    pub fn call_default(&self, message: &str) -> TransportResult<String> {
        self.call(message, self.config.default_timeout, 0)
    }

    /// Byte-level [`call`](Self::call)
    pub fn call_bytes(
        &self,
        message: &[u8],
        timeout: Option<Duration>,
        preempt_bits: u32,
    ) -> TransportResult<Vec<u8>> {
        if message.len() > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: message.len(),
                max_size: self.config.max_message_size,
            });
        }

        // Held for the whole exchange: one call in flight per client
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.socket()?;

        self.send_with_recovery(&mut lifecycle, message)?;
        self.receive_reply(&mut lifecycle, message, timeout, preempt_bits)
    }

    fn send_with_recovery(
        &self,
        lifecycle: &mut SocketLifecycle,
        message: &[u8],
    ) -> TransportResult<()> {
        let first_error = match self.send_frame(lifecycle.socket()?, message) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        self.sink.error(&format!(
            "Failed to send request to {}: {}",
            lifecycle.endpoint(),
            first_error
        ));
        self.sink.info("Re-creating zmq socket and trying again");
        lifecycle.reinitialize()?;

        self.send_frame(lifecycle.socket()?, message)
            .map_err(|e| {
                self.sink.error(&format!(
                    "Failed to send request to {} after re-creating socket: {}",
                    lifecycle.endpoint(),
                    e
                ));
                TransportError::SendFailed(format!("{}: {}", lifecycle.endpoint(), e))
            })
    }

    fn receive_reply(
        &self,
        lifecycle: &mut SocketLifecycle,
        message: &[u8],
        timeout: Option<Duration>,
        preempt_bits: u32,
    ) -> TransportResult<Vec<u8>> {
        let started = Instant::now();
        // A limit past the end of representable time is no limit
        let deadline = timeout.and_then(|limit| started.checked_add(limit).map(|at| (at, limit)));
        let preempt = self.preempt.as_ref().filter(|_| preempt_bits != 0);

        loop {
            if let Some(source) = preempt {
                if source.is_preempted(preempt_bits) {
                    let command = String::from_utf8_lossy(message);
                    self.sink.error(&format!(
                        "Preempted after {:.3}s waiting for response of command {}",
                        started.elapsed().as_secs_f64(),
                        truncate_for_log(&command)
                    ));
                    return Err(TransportError::user_interrupt(&command, preempt_bits));
                }
            }

            let wait_ms = match deadline {
                Some((deadline, limit)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        let err = TransportError::timeout(&String::from_utf8_lossy(message), limit);
                        self.sink.error(&err.to_string());
                        return Err(err);
                    }
                    match preempt {
                        Some(_) => poll_millis(remaining.min(self.config.poll_interval)),
                        None => poll_millis(remaining),
                    }
                }
                None => match preempt {
                    Some(_) => poll_millis(self.config.poll_interval),
                    None => -1,
                },
            };

            match self.poll_reply(lifecycle.socket()?, wait_ms) {
                Ok(true) => {
                    let received = recv_message(lifecycle.socket()?, 0);
                    return received.map_err(|e| self.fail_receive(lifecycle, e));
                }
                Ok(false) => continue,
                Err(e) => return Err(self.fail_receive(lifecycle, e)),
            }
        }
    }

    fn send_frame(&self, socket: &zmq::Socket, message: &[u8]) -> zmq::Result<()> {
        if let Some(fault) = self.injected_send_fault() {
            return Err(fault);
        }
        socket.send(message, zmq::DONTWAIT)
    }

    fn poll_reply(&self, socket: &zmq::Socket, wait_ms: i64) -> zmq::Result<bool> {
        if let Some(fault) = self.injected_poll_fault() {
            return Err(fault);
        }
        readable(socket.poll(zmq::POLLIN, wait_ms))
    }

    #[cfg(test)]
    fn injected_send_fault(&self) -> Option<zmq::Error> {
        self.faults.lock().send.pop_front()
    }

    #[cfg(not(test))]
    fn injected_send_fault(&self) -> Option<zmq::Error> {
        None
    }

    #[cfg(test)]
    fn injected_poll_fault(&self) -> Option<zmq::Error> {
        self.faults.lock().poll.pop_front()
    }

    #[cfg(not(test))]
    fn injected_poll_fault(&self) -> Option<zmq::Error> {
        None
    }

    fn fail_receive(&self, lifecycle: &mut SocketLifecycle, cause: zmq::Error) -> TransportError {
        self.sink.error(&format!(
            "Failed to receive response from {}: {}",
            lifecycle.endpoint(),
            cause
        ));
        self.sink.info("Re-creating zmq socket");
        if let Err(e) = lifecycle.reinitialize() {
            self.sink.error(&format!("Failed to re-create zmq socket: {}", e));
        }
        TransportError::ReceiveFailed(format!("{}: {}", lifecycle.endpoint(), cause))
    }
}

impl Transport for ZmqReq {
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
        "zmq-req"
    }
}

impl RequestReplyClient for ZmqReq {
    fn request(&self, data: &[u8]) -> TransportResult<Vec<u8>> {
        self.call_bytes(data, self.config.default_timeout, 0)
    }

    fn request_timeout(&self, data: &[u8], timeout: Option<Duration>) -> TransportResult<Vec<u8>> {
        self.call_bytes(data, timeout, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, PreemptFlags};
    use crate::zmq::lifecycle::ContextOwnership;
    use ctrlink_observability::RecordingSink;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Socket errors returned instead of calling into zmq, consumed in order
    #[derive(Default)]
    pub(super) struct InjectedFaults {
        pub(super) send: VecDeque<zmq::Error>,
        pub(super) poll: VecDeque<zmq::Error>,
    }

    /// Answer every request with `pong` until `stop` is raised
    #[cfg(feature = "zmq-server")]
    fn spawn_responder(port: u16, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
        let mut server = crate::zmq::server::ZmqRep::with_port(port).unwrap();
        server.start().unwrap();
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                if server.recv(Some(Duration::from_millis(50))).unwrap().is_some() {
                    server.send(b"pong").unwrap();
                }
            }
        })
    }

    #[test]
    fn test_req_creation() {
        let config = ClientConfig::new(Endpoint::new("127.0.0.1", 31110));
        assert!(ZmqReq::new(config).is_ok());
        assert!(ZmqReq::with_endpoint("", 31110).is_err());
    }

    #[test]
    fn test_req_start_stop() {
        let mut req = ZmqReq::with_endpoint("127.0.0.1", 31111).unwrap();
        assert!(!req.is_running());

        req.start().unwrap();
        assert!(req.is_running());
        assert!(matches!(req.start(), Err(TransportError::AlreadyRunning)));

        req.stop().unwrap();
        req.stop().unwrap();
        assert!(!req.is_running());
    }

    #[test]
    fn test_call_before_start() {
        let req = ZmqReq::with_endpoint("127.0.0.1", 31112).unwrap();
        let err = req.call("{}", Some(Duration::from_millis(10)), 0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotInitialized);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let config = ClientConfig::new(Endpoint::new("127.0.0.1", 31113)).with_max_message_size(8);
        let mut req = ZmqReq::new(config).unwrap();
        req.start().unwrap();

        let err = req.call("0123456789", Some(Duration::from_millis(10)), 0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArguments);
    }

    #[test]
    fn test_shared_context_is_borrowed() {
        let context = zmq::Context::new();
        let mut req = ZmqReq::with_endpoint("127.0.0.1", 31114)
            .unwrap()
            .with_context(context.clone());
        req.start().unwrap();
        assert_eq!(req.lifecycle.lock().ownership(), ContextOwnership::Borrowed);
    }

    #[test]
    fn test_preempt_already_raised_interrupts() {
        let flags = Arc::new(PreemptFlags::new());
        flags.raise(0b10);
        let mut req = ZmqReq::with_endpoint("127.0.0.1", 31115)
            .unwrap()
            .with_preempt(flags.clone());
        req.start().unwrap();

        let started = Instant::now();
        let err = req.call("{}", Some(Duration::from_secs(5)), 0b10).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UserInterrupt);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_preempt_bits_zero_ignores_source() {
        let flags = Arc::new(PreemptFlags::new());
        flags.raise(u32::MAX);
        let mut req = ZmqReq::with_endpoint("127.0.0.1", 31116)
            .unwrap()
            .with_preempt(flags);
        req.start().unwrap();

        let err = req.call("{}", Some(Duration::from_millis(100)), 0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
    }

    #[test]
    fn test_unbounded_timeout_still_preemptible() {
        let flags = Arc::new(PreemptFlags::new());
        flags.raise(0b1);
        let mut req = ZmqReq::with_endpoint("127.0.0.1", 31117)
            .unwrap()
            .with_preempt(flags);
        req.start().unwrap();

        let err = req.call("{}", Some(Duration::MAX), 0b1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UserInterrupt);
    }

    #[cfg(feature = "zmq-server")]
    #[test]
    fn test_send_failing_twice_leaves_fresh_socket() {
        let stop = Arc::new(AtomicBool::new(false));
        let responder = spawn_responder(31118, stop.clone());

        let sink = RecordingSink::new();
        let mut req = ZmqReq::with_endpoint("127.0.0.1", 31118)
            .unwrap()
            .with_sink(sink.clone());
        req.start().unwrap();
        req.faults
            .lock()
            .send
            .extend([zmq::Error::EFSM, zmq::Error::EAGAIN]);

        let err = req.call("ping", Some(Duration::from_secs(5)), 0).unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
        assert_eq!(err.code(), ErrorCode::TransportFault);
        assert_eq!(sink.count_containing("Re-creating zmq socket and trying again"), 1);
        assert_eq!(sink.count_containing("after re-creating socket"), 1);
        assert_eq!(sink.count_containing("Connecting to socket at tcp://127.0.0.1:31118"), 2);
        assert!(req.is_running());

        // The rebuilt socket is ready for the next request
        let reply = req.call("ping", Some(Duration::from_secs(5)), 0).unwrap();
        assert_eq!(reply, "pong");
        assert_eq!(sink.count_containing("Re-creating zmq socket and trying again"), 1);

        stop.store(true, Ordering::Relaxed);
        responder.join().unwrap();
    }

    #[cfg(feature = "zmq-server")]
    #[test]
    fn test_receive_fault_recreates_socket_and_fails() {
        let stop = Arc::new(AtomicBool::new(false));
        let responder = spawn_responder(31119, stop.clone());

        let sink = RecordingSink::new();
        let mut req = ZmqReq::with_endpoint("127.0.0.1", 31119)
            .unwrap()
            .with_sink(sink.clone());
        req.start().unwrap();
        req.faults.lock().poll.push_back(zmq::Error::ETERM);

        let err = req.call("ping", Some(Duration::from_secs(5)), 0).unwrap_err();
        assert!(matches!(err, TransportError::ReceiveFailed(_)));
        assert_eq!(err.code(), ErrorCode::TransportFault);
        assert_eq!(sink.count_containing("Failed to receive response from tcp://127.0.0.1:31119"), 1);
        assert_eq!(sink.count_containing("Re-creating zmq socket"), 1);
        assert_eq!(sink.count_containing("Connecting to socket at tcp://127.0.0.1:31119"), 2);

        // Next call goes straight out on the fresh socket
        let reply = req.call("ping", Some(Duration::from_secs(5)), 0).unwrap();
        assert_eq!(reply, "pong");
        assert_eq!(sink.count_containing("trying again"), 0);
        assert_eq!(sink.count_containing("Re-creating zmq socket"), 1);

        stop.store(true, Ordering::Relaxed);
        responder.join().unwrap();
    }
}
