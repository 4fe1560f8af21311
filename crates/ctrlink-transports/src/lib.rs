// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ctrlink-transports
//!
//! ZMQ messaging primitives used to talk to a controller's task sessions.
//!
//! ### Roles
//! - **Client**: REQ ([`zmq::client::ZmqReq`]) with per-call timeout, cooperative
//!   preemption and automatic socket recovery
//! - **Framed client**: REQ ([`zmq::client::ZmqFramedReq`]) with multipart
//!   requests and a `t`/`f` status frame on every reply
//! - **Server**: REP ([`zmq::server::ZmqRep`]) for mock peers and local control loops
//! - **Publisher**: PUB ([`zmq::server::ZmqPub`]), never blocks, drops on overflow
//! - **Subscriber**: SUB ([`zmq::client::ZmqSub`]), all topics, freshest message wins
//!
//! Every role sits on a [`zmq::SocketLifecycle`] that creates the socket on a
//! private or caller-supplied context and tears it down idempotently.
//!
//! ## Feature Flags
//!
//! ```toml
//! [dependencies]
//! ctrlink-transports = { version = "0.3", default-features = false, features = ["zmq-client"] }
//! ```
//!
//! - `zmq-server`: REP and PUB
//! - `zmq-client`: REQ and SUB
//! - `zmq`: both (default)
//!
//! ## Errors
//!
//! Every failure is a [`TransportError`] whose [`code`](TransportError::code)
//! is one of the stable [`ErrorCode`] kinds. Timeouts
//! ([`ErrorCode::Timeout`]) and preemption ([`ErrorCode::UserInterrupt`]) are
//! always distinct.
//!
//! ## Example: Request-Reply with preemption
//!
//! ```no_run
//! use ctrlink_transports::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! const OPERATOR_STOP: u32 = 0b1;
//!
//! let stop = Arc::new(PreemptFlags::new());
//! let mut client = ZmqReq::with_endpoint("127.0.0.1", 11000)?.with_preempt(stop.clone());
//! client.start()?;
//!
//! match client.call("{\"command\": \"Ping\"}", Some(Duration::from_secs(5)), OPERATOR_STOP) {
//!     Ok(reply) => println!("{}", reply),
//!     Err(e) if e.code() == ErrorCode::UserInterrupt => println!("stopped by operator"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod common;
pub mod traits;

#[cfg(any(feature = "zmq-server", feature = "zmq-client"))]
pub mod zmq;

// Re-export commonly used types
pub use common::{
    ClientConfig, Endpoint, ErrorCode, Preempt, PreemptFlags, ServerConfig, SharedPreempt,
    SocketOptions, TransportError, TransportResult,
};

pub use traits::{Publisher, ReplyServer, RequestReplyClient, Subscriber, Transport};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::common::*;
    pub use crate::traits::*;

    #[cfg(any(feature = "zmq-server", feature = "zmq-client"))]
    pub use crate::zmq::{ContextOwnership, SocketLifecycle, SocketRole};

    #[cfg(feature = "zmq-server")]
    pub use crate::zmq::server::*;

    #[cfg(feature = "zmq-client")]
    pub use crate::zmq::client::*;
}
