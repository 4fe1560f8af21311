// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Common configuration types for transports

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::error::{TransportError, TransportResult};

/// Default reply deadline for [`call_default`](crate::zmq::client::ZmqReq::call_default)
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest request accepted by the request-reply client (10 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// One side of a messaging socket
///
/// Clients and subscribers connect to `tcp://<host>:<port>`; servers and
/// publishers bind `tcp://*:<port>` and ignore the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint listening on all interfaces
    pub fn any(port: u16) -> Self {
        Self::new("*", port)
    }

    /// Address used by connecting roles
    pub fn connect_address(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    /// Address used by binding roles
    pub fn bind_address(&self) -> String {
        format!("tcp://*:{}", self.port)
    }

    pub fn validate(&self) -> TransportResult<()> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidConfig(
                "Endpoint host cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(TransportError::InvalidConfig(
                "Endpoint port must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

/// Socket tuning applied before connect/bind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketOptions {
    /// Outbound queue depth of publishers and subscribers; excess messages are dropped
    pub high_water_mark: i32,

    /// Linger applied to publishers and subscribers on close
    pub linger_ms: i32,

    pub tcp_keepalive: bool,
    pub tcp_keepalive_idle_secs: i32,
    pub tcp_keepalive_interval_secs: i32,
    pub tcp_keepalive_count: i32,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            high_water_mark: 2,
            linger_ms: 100,
            tcp_keepalive: true,
            tcp_keepalive_idle_secs: 2,
            tcp_keepalive_interval_secs: 2,
            tcp_keepalive_count: 2,
        }
    }
}

impl SocketOptions {
    /// Set the publisher/subscriber high water mark
    pub fn with_high_water_mark(mut self, hwm: i32) -> Self {
        self.high_water_mark = hwm;
        self
    }

    /// Set linger time
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger_ms = i32::try_from(linger.as_millis()).unwrap_or(i32::MAX);
        self
    }

    /// Disable TCP keepalive probes
    pub fn without_keepalive(mut self) -> Self {
        self.tcp_keepalive = false;
        self
    }

    pub fn validate(&self) -> TransportResult<()> {
        if self.high_water_mark <= 0 {
            return Err(TransportError::InvalidConfig(
                "High water mark must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request-reply client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub options: SocketOptions,

    /// Deadline used by `call_default` (None = wait forever)
    pub default_timeout: Option<Duration>,

    /// Poll slice while a preemption check is engaged
    pub poll_interval: Duration,

    /// Requests larger than this are rejected before sending
    pub max_message_size: usize,
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            options: SocketOptions::default(),
            default_timeout: Some(DEFAULT_CALL_TIMEOUT),
            poll_interval: Duration::from_millis(100),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the deadline used by `call_default`
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> TransportResult<()> {
        self.endpoint.validate()?;
        self.options.validate()?;
        if self.poll_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "Poll interval must be greater than 0".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(TransportError::InvalidConfig(
                "Maximum message size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Binding role configuration (reply server, publisher)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub endpoint: Endpoint,
    pub options: SocketOptions,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            endpoint: Endpoint::any(port),
            options: SocketOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> TransportResult<()> {
        self.endpoint.validate()?;
        self.options.validate()
    }
}
