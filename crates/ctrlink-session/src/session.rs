// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Task session bootstrap and command channel
//!
//! A [`TaskSession`] is reached in three steps:
//!
//! 1. **Discovering**: when the caller did not supply both the scene key and
//!    the slave request id, heartbeats are polled under a [`DiscoveryPolicy`].
//! 2. **Parsing**: only the missing identity fields are taken from the heartbeat.
//! 3. **Bound**: a request-reply client is connected to the session's command port.
//!
//! Running out of discovery attempts fails with [`SessionError::NoHeartbeat`].

use crate::discovery::{discover_heartbeat, DiscoveryPolicy, HeartbeatSource, SubscriberHeartbeatSource};
use crate::error::{SessionError, SessionResult};
use crate::heartbeat::{scene_pk_from_heartbeat, slave_request_id_from_heartbeat};
use crate::monitor::HeartbeatMonitor;
use crate::reconnect::{retry_with_backoff, ReconnectionStrategy};
use ctrlink_observability::truncate_for_log;
use ctrlink_transports::prelude::*;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};

/// Longest controller error description carried in [`SessionError::CommandFailed`]
pub const MAX_ERROR_DESCRIPTION: usize = 1000;

/// Task type used when none is configured
pub const DEFAULT_TASK_TYPE: &str = "realtimeitlplanning";

/// Which running task session to talk to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIdentity {
    pub scene_pk: String,
    pub slave_request_id: String,
}

impl SessionIdentity {
    pub fn new(scene_pk: impl Into<String>, slave_request_id: impl Into<String>) -> Self {
        Self {
            scene_pk: scene_pk.into(),
            slave_request_id: slave_request_id.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.scene_pk.is_empty() && !self.slave_request_id.is_empty()
    }

    /// Fill the empty fields from `heartbeat`, leaving supplied ones untouched
    pub fn fill_from_heartbeat(&mut self, heartbeat: &str) {
        if self.scene_pk.is_empty() {
            self.scene_pk = scene_pk_from_heartbeat(heartbeat);
            info!("[SESSION] task_scenepk: {} is obtained from heartbeat", self.scene_pk);
        }
        if self.slave_request_id.is_empty() {
            self.slave_request_id = slave_request_id_from_heartbeat(heartbeat);
            info!(
                "[SESSION] slave_request_id: {} is obtained from heartbeat",
                self.slave_request_id
            );
        }
    }

    fn missing_fields(&self) -> String {
        let mut missing = Vec::new();
        if self.scene_pk.is_empty() {
            missing.push("scene primary key");
        }
        if self.slave_request_id.is_empty() {
            missing.push("slave request id");
        }
        missing.join(" and ")
    }
}

/// Resolve the identity, discovering only when a field is missing
///
/// `open_source` is only invoked when discovery is needed.
pub fn resolve_identity<S, F>(
    supplied: SessionIdentity,
    policy: &DiscoveryPolicy,
    open_source: F,
) -> SessionResult<SessionIdentity>
where
    S: HeartbeatSource,
    F: FnOnce() -> SessionResult<S>,
{
    if supplied.is_complete() {
        debug!("[SESSION] Identity supplied, skipping heartbeat discovery");
        return Ok(supplied);
    }

    let mut source = open_source()?;
    let heartbeat = discover_heartbeat(&mut source, policy)?;

    let mut identity = supplied;
    identity.fill_from_heartbeat(&heartbeat);
    if !identity.is_complete() {
        return Err(SessionError::IncompleteIdentity {
            endpoint: source.endpoint(),
            missing: identity.missing_fields(),
        });
    }
    Ok(identity)
}

/// Everything needed to bootstrap a [`TaskSession`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub host: String,
    pub command_port: u16,
    pub heartbeat_port: u16,

    /// Empty = take from heartbeat
    pub scene_pk: String,

    /// Empty = take from heartbeat
    pub slave_request_id: String,

    pub task_type: String,

    /// Defaults merged under every command's parameters
    pub task_parameters: Value,
    pub user_info: Value,

    /// `None` = wait forever
    pub command_timeout: Option<Duration>,

    /// Heartbeat silence after which the command client is rebuilt; `None` disables
    pub reinitialize_timeout: Option<Duration>,

    pub poll_interval: Duration,
    pub discovery: DiscoveryPolicy,
    pub socket_options: SocketOptions,
}

impl SessionOptions {
    pub fn new(host: impl Into<String>, command_port: u16, heartbeat_port: u16) -> Self {
        Self {
            host: host.into(),
            command_port,
            heartbeat_port,
            scene_pk: String::new(),
            slave_request_id: String::new(),
            task_type: DEFAULT_TASK_TYPE.to_string(),
            task_parameters: Value::Object(Map::new()),
            user_info: Value::Object(Map::new()),
            command_timeout: Some(Duration::from_secs(10)),
            reinitialize_timeout: Some(Duration::from_secs(10)),
            poll_interval: Duration::from_millis(100),
            discovery: DiscoveryPolicy::default(),
            socket_options: SocketOptions::default(),
        }
    }

    pub fn with_scene_pk(mut self, scene_pk: impl Into<String>) -> Self {
        self.scene_pk = scene_pk.into();
        self
    }

    pub fn with_slave_request_id(mut self, slave_request_id: impl Into<String>) -> Self {
        self.slave_request_id = slave_request_id.into();
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn with_task_parameters(mut self, task_parameters: Value) -> Self {
        self.task_parameters = task_parameters;
        self
    }

    pub fn with_user_info(mut self, user_info: Value) -> Self {
        self.user_info = user_info;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_reinitialize_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reinitialize_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryPolicy) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_socket_options(mut self, options: SocketOptions) -> Self {
        self.socket_options = options;
        self
    }

    pub fn command_endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.command_port)
    }

    pub fn heartbeat_endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.heartbeat_port)
    }

    /// Identity fields the caller already knows
    pub fn supplied_identity(&self) -> SessionIdentity {
        SessionIdentity::new(self.scene_pk.clone(), self.slave_request_id.clone())
    }

    pub fn validate(&self) -> SessionResult<()> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("host cannot be empty".to_string());
        }
        if self.command_port == 0 || self.heartbeat_port == 0 {
            errors.push("ports must be non-zero".to_string());
        }
        if self.command_port == self.heartbeat_port {
            errors.push(format!(
                "command and heartbeat ports are both {}",
                self.command_port
            ));
        }
        if !self.task_parameters.is_object() {
            errors.push("task parameters must be a JSON object".to_string());
        }
        if !self.user_info.is_object() {
            errors.push("user info must be a JSON object".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SessionError::InvalidArguments(errors.join("; ")))
        }
    }
}

/// Live command channel to one task session
pub struct TaskSession {
    options: SessionOptions,
    identity: SessionIdentity,
    context: zmq::Context,
    client: ZmqReq,
    monitor: Option<HeartbeatMonitor>,
}

impl TaskSession {
    /// Discover the session if needed and connect its command client
    pub fn bootstrap(options: SessionOptions) -> SessionResult<Self> {
        Self::bootstrap_with_context(options, zmq::Context::new())
    }

    /// Like [`bootstrap`](Self::bootstrap), with every socket on `context`
    pub fn bootstrap_with_context(options: SessionOptions, context: zmq::Context) -> SessionResult<Self> {
        options.validate()?;
        let identity = resolve_identity(options.supplied_identity(), &options.discovery, || {
            SubscriberHeartbeatSource::connect(
                Some(&context),
                options.heartbeat_endpoint(),
                options.socket_options.clone(),
            )
        })?;
        Self::bind(options, identity, context)
    }

    /// Bootstrap with heartbeats taken from `source`
    pub fn bootstrap_from_source<S: HeartbeatSource>(
        options: SessionOptions,
        source: S,
    ) -> SessionResult<Self> {
        options.validate()?;
        let identity = resolve_identity(options.supplied_identity(), &options.discovery, || Ok(source))?;
        Self::bind(options, identity, zmq::Context::new())
    }

    /// Bootstrap, retrying retryable failures under `strategy`
    pub fn connect_with_retry(
        options: SessionOptions,
        strategy: &mut ReconnectionStrategy,
    ) -> SessionResult<Self> {
        retry_with_backoff(
            || Self::bootstrap(options.clone()),
            strategy,
            "Task session bootstrap",
        )
    }

    fn bind(options: SessionOptions, identity: SessionIdentity, context: zmq::Context) -> SessionResult<Self> {
        let config = ClientConfig::new(options.command_endpoint())
            .with_options(options.socket_options.clone())
            .with_default_timeout(options.command_timeout)
            .with_poll_interval(options.poll_interval);
        let client = ZmqReq::new(config)?;
        client.initialize(Some(&context))?;

        info!(
            "[SESSION] Bound to task session {} (scene {}) at {}",
            identity.slave_request_id,
            identity.scene_pk,
            options.command_endpoint()
        );
        Ok(Self {
            options,
            identity,
            context,
            client,
            monitor: None,
        })
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Command endpoint of the session
    pub fn endpoint(&self) -> &Endpoint {
        self.client.endpoint()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn context(&self) -> &zmq::Context {
        &self.context
    }

    /// Watch `preempt` during every command wait
    pub fn set_preempt(&mut self, preempt: Option<SharedPreempt>) {
        self.client.set_preempt(preempt);
    }

    /// Rebuild the command client
    pub fn reinitialize(&self) -> SessionResult<()> {
        info!("[SESSION] Re-creating command client for {}", self.endpoint());
        self.client.reinitialize()?;
        Ok(())
    }

    /// Start watching the session's heartbeat
    ///
    /// When the heartbeat goes silent for the configured reinitialize timeout,
    /// the command client is rebuilt before the next command.
    pub fn start_monitor(&mut self) -> SessionResult<()> {
        if self.monitor.is_some() {
            return Err(SessionError::InvalidState(
                "Heartbeat monitor already running".to_string(),
            ));
        }
        self.monitor = Some(HeartbeatMonitor::start_with_options(
            self.context.clone(),
            self.options.heartbeat_endpoint(),
            self.options.socket_options.clone(),
            self.options.reinitialize_timeout,
        )?);
        Ok(())
    }

    pub fn stop_monitor(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
    }

    /// Newest live heartbeat seen by the monitor
    pub fn latest_heartbeat(&self) -> Option<String> {
        self.monitor.as_ref().and_then(HeartbeatMonitor::latest)
    }

    fn reinitialize_if_requested(&self) -> SessionResult<()> {
        let requested = self
            .monitor
            .as_ref()
            .is_some_and(HeartbeatMonitor::take_reinitialize_request);
        if requested {
            self.reinitialize()?;
        }
        Ok(())
    }

    /// Send a raw command and return the raw reply
    pub fn execute_raw(&self, command: &str, timeout: Option<Duration>) -> SessionResult<String> {
        self.execute_raw_preemptible(command, timeout, 0)
    }

    /// Like [`execute_raw`](Self::execute_raw), aborting when `preempt_bits` fire
    pub fn execute_raw_preemptible(
        &self,
        command: &str,
        timeout: Option<Duration>,
        preempt_bits: u32,
    ) -> SessionResult<String> {
        self.reinitialize_if_requested()?;

        let result = self
            .client
            .call(command, timeout, preempt_bits)
            .map_err(SessionError::from)
            .and_then(|reply| {
                if reply.is_empty() {
                    Err(SessionError::NoResponse {
                        command: truncate_for_log(command),
                    })
                } else {
                    Ok(reply)
                }
            });

        result.map_err(|e| {
            error!("[SESSION] {}", e);
            rebuild_after_no_response(e, || self.reinitialize())
        })
    }

    /// Routing envelope for `task_parameters`
    ///
    /// Object parameters are merged over the session's default parameters.
    pub fn command_envelope(&self, task_parameters: Value) -> Value {
        let parameters = match (&self.options.task_parameters, task_parameters) {
            (Value::Object(defaults), Value::Object(overrides)) => {
                let mut merged = defaults.clone();
                merged.extend(overrides);
                Value::Object(merged)
            }
            (_, other) => other,
        };

        json!({
            "fnname": "RunCommand",
            "taskparams": {
                "tasktype": self.options.task_type,
                "taskparameters": parameters,
                "sceneparams": {
                    "scenepk": self.identity.scene_pk,
                },
            },
            "userinfo": self.options.user_info,
            "slaverequestid": self.identity.slave_request_id,
        })
    }

    /// Run a command on the session and return its JSON reply
    pub fn execute_command(
        &self,
        task_parameters: Value,
        timeout: Option<Duration>,
    ) -> SessionResult<Value> {
        let command = self.command_envelope(task_parameters).to_string();
        let reply = self.execute_raw(&command, timeout)?;

        let value: Value = serde_json::from_str(&reply).map_err(|e| {
            SessionError::InvalidReply(format!("{}: {}", e, truncate_for_log(&reply)))
        })?;
        check_reply_error(&value)?;
        Ok(value)
    }

    /// [`execute_command`](Self::execute_command) with the configured timeout
    pub fn execute_command_default(&self, task_parameters: Value) -> SessionResult<Value> {
        self.execute_command(task_parameters, self.options.command_timeout)
    }
}

impl Drop for TaskSession {
    fn drop(&mut self) {
        self.stop_monitor();
        self.client.destroy();
    }
}

/// Turn an `error.errorcode` reply into [`SessionError::CommandFailed`]
fn check_reply_error(reply: &Value) -> SessionResult<()> {
    let Some(error) = reply.get("error") else {
        return Ok(());
    };
    let Some(code) = error.get("errorcode") else {
        return Ok(());
    };

    let error_code = match code {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let description = match error.get("description").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => text,
        _ => error_code.as_str(),
    };

    Err(SessionError::CommandFailed {
        description: description.chars().take(MAX_ERROR_DESCRIPTION).collect(),
        error_code,
    })
}

/// Rebuild the client after `error` if it was a missing reply
///
/// `error` is returned either way; a failed rebuild is only logged.
fn rebuild_after_no_response(
    error: SessionError,
    rebuild: impl FnOnce() -> SessionResult<()>,
) -> SessionError {
    if error.code() == ErrorCode::NoResponse {
        if let Err(e) = rebuild() {
            error!("[SESSION] Failed to re-create command client: {}", e);
        }
    }
    error
}
