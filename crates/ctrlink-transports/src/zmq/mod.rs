// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ transport implementations
//!
//! - **Request-Reply**: REP (server) ↔ REQ (client)
//! - **Framed Request-Reply**: REQ with a `t`/`f` status frame on every reply
//! - **Publish-Subscribe**: PUB (server) ↔ SUB (client)
//!
//! ## Feature Flags
//!
//! - `zmq-server`: Enable binding sockets (REP, PUB)
//! - `zmq-client`: Enable connecting sockets (REQ, SUB)
//! - `zmq`: Enable both client and server
//!
//! ## Example (Server)
//!
//! ```no_run
//! use ctrlink_transports::zmq::server::ZmqRep;
//! use ctrlink_transports::traits::Transport;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = ZmqRep::with_port(11000)?;
//! server.start()?;
//!
//! loop {
//!     if let Some(request) = server.recv(Some(Duration::from_millis(100)))? {
//!         println!("Received: {:?}", request);
//!         server.send(b"{}")?;
//!     }
//! }
//! # }
//! ```
//!
//! ## Example (Client)
//!
//! ```no_run
//! use ctrlink_transports::zmq::client::ZmqReq;
//! use ctrlink_transports::traits::Transport;
//! use std::time::Duration;
//!
//! let mut client = ZmqReq::with_endpoint("127.0.0.1", 11000)?;
//! client.start()?;
//!
//! let reply = client.call("{\"command\": \"Ping\"}", Some(Duration::from_secs(5)), 0)?;
//! println!("Reply: {}", reply);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod lifecycle;

#[cfg(feature = "zmq-server")]
pub mod server;

#[cfg(feature = "zmq-client")]
pub mod client;

pub use lifecycle::{ContextOwnership, SocketLifecycle, SocketRole};

#[cfg(feature = "zmq-server")]
pub use server::{ZmqPub, ZmqRep};

#[cfg(feature = "zmq-client")]
pub use client::{ZmqFramedReq, ZmqReq, ZmqSub};

use std::time::Duration;

/// Receive one message, joining multipart frames into a single payload
pub(crate) fn recv_message(socket: &zmq::Socket, flags: i32) -> zmq::Result<Vec<u8>> {
    let mut payload = socket.recv_bytes(flags)?;
    while socket.get_rcvmore()? {
        payload.extend_from_slice(&socket.recv_bytes(0)?);
    }
    Ok(payload)
}

/// Wait up to `wait` for a readable socket
pub(crate) fn poll_readable(socket: &zmq::Socket, wait: Duration) -> zmq::Result<bool> {
    readable(socket.poll(zmq::POLLIN, poll_millis(wait)))
}

/// Interpret a POLLIN result; an interrupted poll is "nothing ready"
pub(crate) fn readable(polled: zmq::Result<i32>) -> zmq::Result<bool> {
    match polled {
        Ok(ready) => Ok(ready > 0),
        Err(zmq::Error::EINTR) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Poll timeout in whole milliseconds, rounded up so a wait never ends early
pub(crate) fn poll_millis(wait: Duration) -> i64 {
    let micros = wait.as_micros();
    i64::try_from(micros.div_ceil(1000)).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_millis_rounds_up() {
        assert_eq!(poll_millis(Duration::ZERO), 0);
        assert_eq!(poll_millis(Duration::from_micros(1)), 1);
        assert_eq!(poll_millis(Duration::from_millis(100)), 100);
        assert_eq!(poll_millis(Duration::from_micros(100_400)), 101);
    }

    #[test]
    fn test_interrupted_poll_is_not_ready() {
        assert_eq!(readable(Err(zmq::Error::EINTR)), Ok(false));
        assert_eq!(readable(Ok(0)), Ok(false));
        assert_eq!(readable(Ok(1)), Ok(true));
        assert_eq!(readable(Err(zmq::Error::ETERM)), Err(zmq::Error::ETERM));
    }
}
