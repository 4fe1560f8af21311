// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Conversions from the loaded configuration file

use crate::discovery::DiscoveryPolicy;
use crate::error::{SessionError, SessionResult};
use crate::session::SessionOptions;
use ctrlink_config::{DiscoveryConfig, SocketsConfig};
use ctrlink_transports::SocketOptions;
use serde_json::Value;
use std::time::Duration;

pub fn socket_options_from_config(sockets: &SocketsConfig) -> SocketOptions {
    SocketOptions {
        high_water_mark: sockets.high_water_mark,
        linger_ms: sockets.linger_ms,
        tcp_keepalive: sockets.tcp_keepalive,
        tcp_keepalive_idle_secs: sockets.tcp_keepalive_idle_secs,
        tcp_keepalive_interval_secs: sockets.tcp_keepalive_interval_secs,
        tcp_keepalive_count: sockets.tcp_keepalive_count,
    }
}

impl DiscoveryPolicy {
    pub fn from_config(discovery: &DiscoveryConfig) -> Self {
        Self::new(
            discovery.max_attempts,
            Duration::from_millis(discovery.retry_interval_ms),
        )
    }
}

fn parse_json_object(field: &str, text: &str) -> SessionResult<Value> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| SessionError::InvalidArguments(format!("{} is not valid JSON: {}", field, e)))?;
    if !value.is_object() {
        return Err(SessionError::InvalidArguments(format!(
            "{} must be a JSON object",
            field
        )));
    }
    Ok(value)
}

impl SessionOptions {
    /// Session options for the controller described by `config`
    pub fn from_config(config: &ctrlink_config::ClientConfig) -> SessionResult<Self> {
        let session = &config.session;
        Ok(Self::new(
            config.controller.host.clone(),
            config.ports.command_port,
            config.ports.heartbeat_port,
        )
        .with_scene_pk(session.scene_pk.clone())
        .with_slave_request_id(session.slave_request_id.clone())
        .with_task_type(session.task_type.clone())
        .with_task_parameters(parse_json_object("task_parameters", &session.task_parameters)?)
        .with_user_info(parse_json_object("user_info", &session.user_info)?)
        .with_command_timeout(config.timeouts.command_timeout())
        .with_reinitialize_timeout(config.timeouts.reinitialize_timeout())
        .with_poll_interval(config.timeouts.poll_interval())
        .with_discovery(DiscoveryPolicy::from_config(&config.discovery))
        .with_socket_options(socket_options_from_config(&config.sockets)))
    }
}
