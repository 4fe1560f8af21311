// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Heartbeat discovery with a hard attempt budget

use crate::error::{SessionError, SessionResult};
use ctrlink_transports::prelude::*;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How hard discovery tries before giving up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryPolicy {
    /// Number of fetch attempts (at least one is always made)
    pub max_attempts: u32,

    /// Minimum wall time of each attempt
    pub retry_interval: Duration,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_interval: Duration::from_millis(100),
        }
    }
}

impl DiscoveryPolicy {
    pub fn new(max_attempts: u32, retry_interval: Duration) -> Self {
        Self {
            max_attempts,
            retry_interval,
        }
    }

    /// Approximate wall time spent before discovery fails
    pub fn budget(&self) -> Duration {
        self.retry_interval.saturating_mul(self.max_attempts.max(1))
    }
}

/// Something that can hand out the latest heartbeat
pub trait HeartbeatSource {
    /// Wait up to `wait` for a heartbeat
    fn fetch(&mut self, wait: Duration) -> SessionResult<Option<String>>;

    /// Address reported when discovery fails
    fn endpoint(&self) -> String;
}

/// Heartbeat source backed by a subscriber socket
pub struct SubscriberHeartbeatSource {
    subscriber: ZmqSub,
}

impl SubscriberHeartbeatSource {
    /// Subscribe to `endpoint`, on `context` when given
    pub fn connect(
        context: Option<&zmq::Context>,
        endpoint: Endpoint,
        options: SocketOptions,
    ) -> SessionResult<Self> {
        let subscriber = ZmqSub::new(ClientConfig::new(endpoint).with_options(options))?;
        subscriber.initialize(context)?;
        Ok(Self { subscriber })
    }
}

impl HeartbeatSource for SubscriberHeartbeatSource {
    fn fetch(&mut self, wait: Duration) -> SessionResult<Option<String>> {
        let latest = self.subscriber.receive_latest(Some(wait))?;
        Ok(latest.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn endpoint(&self) -> String {
        self.subscriber.endpoint().connect_address()
    }
}

impl Drop for SubscriberHeartbeatSource {
    fn drop(&mut self) {
        self.subscriber.destroy();
    }
}

/// Poll `source` until a non-empty heartbeat arrives or the budget runs out
pub fn discover_heartbeat<S>(source: &mut S, policy: &DiscoveryPolicy) -> SessionResult<String>
where
    S: HeartbeatSource + ?Sized,
{
    let attempts = policy.max_attempts.max(1);
    info!("[HEARTBEAT] Connecting to heartbeat at {}", source.endpoint());

    for attempt in 1..=attempts {
        let started = Instant::now();
        match source.fetch(policy.retry_interval)? {
            Some(heartbeat) if !heartbeat.is_empty() => {
                debug!("[HEARTBEAT] Received heartbeat on attempt {}/{}", attempt, attempts);
                return Ok(heartbeat);
            }
            _ => info!("[HEARTBEAT] Failed to get heartbeat {}/{}", attempt, attempts),
        }

        let spent = started.elapsed();
        if spent < policy.retry_interval {
            thread::sleep(policy.retry_interval - spent);
        }
    }

    Err(SessionError::NoHeartbeat {
        endpoint: source.endpoint(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedSource {
        replies: Vec<Option<String>>,
        calls: usize,
    }

    impl HeartbeatSource for ScriptedSource {
        fn fetch(&mut self, _wait: Duration) -> SessionResult<Option<String>> {
            let reply = self.replies.get(self.calls).cloned().flatten();
            self.calls += 1;
            Ok(reply)
        }

        fn endpoint(&self) -> String {
            "tcp://scripted:1".to_string()
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = DiscoveryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.retry_interval, Duration::from_millis(100));
        assert_eq!(policy.budget(), Duration::from_secs(1));
    }

    #[test]
    fn test_stops_at_first_heartbeat() {
        let mut source = ScriptedSource {
            replies: vec![None, Some(String::new()), Some("{\"status\":\"ok\"}".to_string())],
            calls: 0,
        };
        let policy = DiscoveryPolicy::new(10, Duration::from_millis(1));

        let heartbeat = discover_heartbeat(&mut source, &policy).unwrap();
        assert_eq!(heartbeat, "{\"status\":\"ok\"}");
        assert_eq!(source.calls, 3);
    }

    #[test]
    fn test_exhausted_budget_names_endpoint() {
        let mut source = ScriptedSource {
            replies: vec![],
            calls: 0,
        };
        let policy = DiscoveryPolicy::new(4, Duration::from_millis(1));

        let err = discover_heartbeat(&mut source, &policy).unwrap_err();
        assert_eq!(source.calls, 4);
        assert!(err.to_string().contains("tcp://scripted:1"));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let mut source = ScriptedSource {
            replies: vec![],
            calls: 0,
        };
        let policy = DiscoveryPolicy::new(0, Duration::from_millis(1));

        assert!(discover_heartbeat(&mut source, &policy).is_err());
        assert_eq!(source.calls, 1);
    }
}
