// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ctrlink - Controller Link
//!
//! Client library for talking to a remote robot controller over ZeroMQ:
//! request-reply calls with timeout, preemption and socket recovery, plus
//! heartbeat-driven discovery of running task sessions.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! ctrlink = "0.3"  # Default: transports + session
//! ```
//!
//! ## Feature Flags
//!
//! - **`session`** (default): heartbeat discovery, [`TaskSession`](session::TaskSession),
//!   heartbeat monitor and publisher, and the `ctrlink-task` tool
//! - **`file-logging`**: daily log files in addition to console output
//!
//! ## Usage Examples
//!
//! ### Raw request-reply
//!
//! ```rust,no_run
//! use ctrlink::prelude::*;
//! use std::time::Duration;
//!
//! let mut client = ZmqReq::with_endpoint("127.0.0.1", 11000)?;
//! client.start()?;
//! let reply = client.call("{\"command\": \"Ping\"}", Some(Duration::from_secs(5)), 0)?;
//! # Ok::<(), TransportError>(())
//! ```
//!
//! ### Task session from a configuration file
//!
//! ```rust,no_run
//! use ctrlink::prelude::*;
//! use serde_json::json;
//!
//! let config = ctrlink::config::load_config(None, None)?;
//! let session = TaskSession::bootstrap(SessionOptions::from_config(&config)?)?;
//! let reply = session.execute_command_default(json!({"command": "GetState"}))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export foundation
pub use ctrlink_config as config;
pub use ctrlink_observability as observability;

// Re-export transport layer
pub use ctrlink_transports as transports;

// Re-export session layer
#[cfg(feature = "session")]
pub use ctrlink_session as session;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::transports::prelude::*;

    #[cfg(feature = "session")]
    pub use crate::session::{
        DiscoveryPolicy, HeartbeatMonitor, HeartbeatPublisher, ReconnectionStrategy, SessionError,
        SessionIdentity, SessionOptions, SessionResult, TaskSession,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let endpoint = Endpoint::new("127.0.0.1", 11000);
        assert_eq!(endpoint.connect_address(), "tcp://127.0.0.1:11000");
        assert_eq!(ErrorCode::NoResponse.as_str(), "NoResponse");
    }

    #[cfg(feature = "session")]
    #[test]
    fn test_session_reexports() {
        use crate::prelude::*;
        let options = SessionOptions::new("127.0.0.1", 11000, 11001);
        assert_eq!(options.discovery, DiscoveryPolicy::default());
    }
}
