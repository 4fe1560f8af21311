// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Background heartbeat monitor
//!
//! Keeps the newest live heartbeat of a session and flags the session for
//! reinitialization when the heartbeat goes silent.

use crate::error::{SessionError, SessionResult};
use crate::heartbeat::is_alive_heartbeat;
use ctrlink_transports::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Wait per subscriber poll
pub const MONITOR_POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Default)]
struct MonitorState {
    latest: Mutex<Option<String>>,
    reinitialize_requested: AtomicBool,
}

pub struct HeartbeatMonitor {
    endpoint: Endpoint,
    state: Arc<MonitorState>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    /// Subscribe to `endpoint` on `context` and start watching
    ///
    /// `reinitialize_timeout` of `None` disables reinitialization requests.
    pub fn start(
        context: zmq::Context,
        endpoint: Endpoint,
        reinitialize_timeout: Option<Duration>,
    ) -> SessionResult<Self> {
        Self::start_with_options(context, endpoint, SocketOptions::default(), reinitialize_timeout)
    }

    pub fn start_with_options(
        context: zmq::Context,
        endpoint: Endpoint,
        options: SocketOptions,
        reinitialize_timeout: Option<Duration>,
    ) -> SessionResult<Self> {
        let mut subscriber =
            ZmqSub::new(ClientConfig::new(endpoint.clone()).with_options(options))?
                .with_context(context);
        subscriber.start()?;

        let state = Arc::new(MonitorState::default());
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            let address = endpoint.connect_address();
            thread::Builder::new()
                .name("ctrlink-heartbeat-monitor".to_string())
                .spawn(move || {
                    Self::run(subscriber, &address, &state, &running, reinitialize_timeout)
                })
                .map_err(|e| SessionError::Thread(format!("heartbeat monitor: {}", e)))?
        };

        debug!("[HEARTBEAT] Monitor started for {}", endpoint);
        Ok(Self {
            endpoint,
            state,
            running,
            thread: Some(thread),
        })
    }

    fn run(
        mut subscriber: ZmqSub,
        address: &str,
        state: &MonitorState,
        running: &AtomicBool,
        reinitialize_timeout: Option<Duration>,
    ) {
        let mut last_alive = Instant::now();

        while running.load(Ordering::Acquire) {
            match subscriber.receive_latest(Some(MONITOR_POLL_SLICE)) {
                Ok(Some(bytes)) => {
                    let heartbeat = String::from_utf8_lossy(&bytes).into_owned();
                    if is_alive_heartbeat(&heartbeat) {
                        last_alive = Instant::now();
                        *state.latest.lock() = Some(heartbeat);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("[HEARTBEAT] Failed to receive heartbeat from {}: {}", address, e);
                    thread::sleep(MONITOR_POLL_SLICE);
                }
            }

            let Some(limit) = reinitialize_timeout else {
                continue;
            };
            let silent = last_alive.elapsed();
            if silent > limit {
                warn!(
                    "[HEARTBEAT] Have not received heartbeat from {} for {:.3} seconds, reinitializing",
                    address,
                    silent.as_secs_f64()
                );
                if let Err(e) = subscriber.reinitialize() {
                    error!("[HEARTBEAT] Failed to re-create subscriber for {}: {}", address, e);
                }
                state.reinitialize_requested.store(true, Ordering::Release);
                last_alive = Instant::now();
            }
        }

        let _ = subscriber.stop();
        debug!("[HEARTBEAT] Monitor stopped for {}", address);
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Newest heartbeat that reported a live session
    pub fn latest(&self) -> Option<String> {
        self.state.latest.lock().clone()
    }

    /// Consume a pending reinitialization request
    pub fn take_reinitialize_request(&self) -> bool {
        self.state.reinitialize_requested.swap(false, Ordering::AcqRel)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the monitor thread and wait for it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_start_stop() {
        let mut monitor = HeartbeatMonitor::start(
            zmq::Context::new(),
            Endpoint::new("127.0.0.1", 31250),
            Some(Duration::from_secs(10)),
        )
        .unwrap();
        assert!(monitor.is_running());
        assert_eq!(monitor.latest(), None);

        monitor.stop();
        assert!(!monitor.is_running());
        monitor.stop();
    }

    #[test]
    fn test_silence_requests_reinitialize() {
        let monitor = HeartbeatMonitor::start(
            zmq::Context::new(),
            Endpoint::new("127.0.0.1", 31251),
            Some(Duration::from_millis(150)),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(3);
        let mut requested = false;
        while Instant::now() < deadline {
            if monitor.take_reinitialize_request() {
                requested = true;
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(requested);
    }

    #[test]
    fn test_disabled_timeout_never_requests() {
        let monitor = HeartbeatMonitor::start(
            zmq::Context::new(),
            Endpoint::new("127.0.0.1", 31252),
            None,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(300));
        assert!(!monitor.take_reinitialize_request());
    }
}
