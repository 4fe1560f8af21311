// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Heartbeat payload parsing
//!
//! A task session publishes JSON of the form
//!
//! ```json
//! {
//!   "status": "active",
//!   "taskstate": {},
//!   "slavestates": {
//!     "slaverequestid-worker-1": { "currentsceneuri": "mujin:/cell.mujin.dae", "taskstate": {} }
//!   }
//! }
//! ```
//!
//! The extraction functions never fail: anything unexpected yields an empty string.

use serde::Deserialize;
use serde_json::Value;

/// Prefix of every `slavestates` key
pub const SLAVE_REQUEST_ID_PREFIX: &str = "slaverequestid-";

/// Scheme of scene URIs
pub const SCENE_URI_SCHEME: &str = "mujin:/";

/// Status the controller publishes for a session that went away
pub const LOST_STATUS: &str = "lost";

/// Lexicographically smallest slave entry
fn first_slave_state(heartbeat: &str) -> Option<(String, Value)> {
    let parsed: Value = serde_json::from_str(heartbeat).ok()?;
    let states = parsed.get("slavestates")?.as_object()?;
    let key = states.keys().min()?;
    Some((key.clone(), states.get(key)?.clone()))
}

/// Slave request id of the session announced in `heartbeat`
pub fn slave_request_id_from_heartbeat(heartbeat: &str) -> String {
    match first_slave_state(heartbeat) {
        Some((key, _)) => key
            .strip_prefix(SLAVE_REQUEST_ID_PREFIX)
            .unwrap_or_default()
            .to_string(),
        None => String::new(),
    }
}

/// Scene primary key of the session announced in `heartbeat`
pub fn scene_pk_from_heartbeat(heartbeat: &str) -> String {
    let uri = first_slave_state(heartbeat)
        .and_then(|(_, state)| state.get("currentsceneuri")?.as_str().map(str::to_string))
        .unwrap_or_default();
    match uri.strip_prefix(SCENE_URI_SCHEME) {
        Some(pk) => pk.to_string(),
        None => uri,
    }
}

/// Liveness fields of a heartbeat
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HeartbeatStatus {
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub taskstate: Value,
}

impl HeartbeatStatus {
    pub fn parse(heartbeat: &str) -> Option<Self> {
        serde_json::from_str(heartbeat).ok()
    }

    /// Whether the publishing session reports itself as running
    pub fn is_alive(&self) -> bool {
        self.status.chars().count() > 1 && self.status != LOST_STATUS
    }
}

/// True when `heartbeat` parses and reports a live session
pub fn is_alive_heartbeat(heartbeat: &str) -> bool {
    HeartbeatStatus::parse(heartbeat).is_some_and(|status| status.is_alive())
}
