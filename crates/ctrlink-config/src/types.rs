// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to one section of `ctrlink.toml`. Every field has a
//! default, so a partial (or empty) file is valid input.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub controller: ControllerConfig,
    pub ports: PortsConfig,
    pub timeouts: TimeoutsConfig,
    pub discovery: DiscoveryConfig,
    pub sockets: SocketsConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Where the controller lives
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub host: String,
    /// HTTP port of the controller's REST surface (informational for this crate)
    pub http_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 80,
        }
    }
}

/// Task session ports
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortsConfig {
    /// Request/reply port of the task session
    pub command_port: u16,
    /// Port the session publishes its heartbeat on
    pub heartbeat_port: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            command_port: 11000,
            heartbeat_port: 11001,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Per-command reply deadline in seconds; `<= 0` waits forever
    pub command_timeout_secs: f64,
    /// Silence on the heartbeat channel tolerated before the command socket is rebuilt
    pub reinitialize_timeout_secs: f64,
    /// Slice used while waiting for a reply when preemption is watched
    pub poll_interval_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 10.0,
            reinitialize_timeout_secs: 10.0,
            poll_interval_ms: 100,
        }
    }
}

impl TimeoutsConfig {
    /// Command deadline, `None` meaning no deadline
    pub fn command_timeout(&self) -> Option<Duration> {
        secs_to_duration(self.command_timeout_secs)
    }

    pub fn reinitialize_timeout(&self) -> Option<Duration> {
        secs_to_duration(self.reinitialize_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Heartbeat discovery retry budget
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub max_attempts: u32,
    pub retry_interval_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_interval_ms: 100,
        }
    }
}

/// Low-level socket tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocketsConfig {
    pub high_water_mark: i32,
    pub linger_ms: i32,
    pub tcp_keepalive: bool,
    pub tcp_keepalive_idle_secs: i32,
    pub tcp_keepalive_interval_secs: i32,
    pub tcp_keepalive_count: i32,
}

impl Default for SocketsConfig {
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

/// Task session identity and command defaults
///
/// Empty `scene_pk` / `slave_request_id` are discovered from the heartbeat.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub scene_pk: String,
    pub slave_request_id: String,
    pub task_type: String,
    /// JSON object merged into every command
    pub task_parameters: String,
    /// JSON object sent as `userinfo`
    pub user_info: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scene_pk: String::new(),
            slave_request_id: String::new(),
            task_type: "realtimeitlplanning".to_string(),
            task_parameters: "{}".to_string(),
            user_info: "{}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Positive seconds as a deadline; zero, negative, NaN or unrepresentably
/// large values mean no deadline
fn secs_to_duration(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
