// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ctrlink-session
//!
//! Finds a running task session through its heartbeat and keeps a command
//! channel to it.
//!
//! ## Example
//!
//! ```no_run
//! use ctrlink_session::{SessionOptions, TaskSession};
//! use serde_json::json;
//!
//! let options = SessionOptions::new("192.168.1.10", 11000, 11001);
//! let mut session = TaskSession::bootstrap(options)?;
//! session.start_monitor()?;
//!
//! let reply = session.execute_command_default(json!({"command": "GetState"}))?;
//! println!("{}", reply);
//! # Ok::<(), ctrlink_session::SessionError>(())
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod heartbeat;
pub mod monitor;
pub mod publisher;
pub mod reconnect;
pub mod session;

pub use config::socket_options_from_config;
pub use discovery::{discover_heartbeat, DiscoveryPolicy, HeartbeatSource, SubscriberHeartbeatSource};
pub use error::{SessionError, SessionResult};
pub use heartbeat::{
    is_alive_heartbeat, scene_pk_from_heartbeat, slave_request_id_from_heartbeat, HeartbeatStatus,
};
pub use monitor::HeartbeatMonitor;
pub use publisher::{HeartbeatPublisher, DEFAULT_HEARTBEAT_PAYLOAD};
pub use reconnect::{retry_with_backoff, ReconnectionStrategy};
pub use session::{resolve_identity, SessionIdentity, SessionOptions, TaskSession};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
