// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Periodic heartbeat publisher
//!
//! Plays the remote side of a task session: binds a PUB socket and repeats
//! the current payload every interval.

use crate::error::{SessionError, SessionResult};
use ctrlink_transports::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Payload published when none is given
pub const DEFAULT_HEARTBEAT_PAYLOAD: &[u8] = &[0xFF];

pub struct HeartbeatPublisher {
    port: u16,
    interval: Duration,
    payload: Arc<Mutex<Vec<u8>>>,
    options: SocketOptions,
    context: Option<zmq::Context>,
    running: Arc<AtomicBool>,
    published: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl HeartbeatPublisher {
    pub fn new(port: u16, interval: Duration, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            port,
            interval,
            payload: Arc::new(Mutex::new(payload.into())),
            options: SocketOptions::default(),
            context: None,
            running: Arc::new(AtomicBool::new(false)),
            published: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    /// Publisher of [`DEFAULT_HEARTBEAT_PAYLOAD`]
    pub fn with_default_payload(port: u16, interval: Duration) -> Self {
        Self::new(port, interval, DEFAULT_HEARTBEAT_PAYLOAD)
    }

    pub fn with_context(mut self, context: zmq::Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the payload sent from the next tick on
    pub fn set_payload(&self, payload: impl Into<Vec<u8>>) {
        *self.payload.lock() = payload.into();
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Messages accepted by the socket so far
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bind and start publishing
    ///
    /// Bind failures are reported here rather than from the worker thread.
    pub fn start(&mut self) -> SessionResult<()> {
        if self.is_running() {
            return Err(SessionError::InvalidState(
                "Heartbeat publisher already running".to_string(),
            ));
        }

        let publisher = ZmqPub::new(ServerConfig::new(self.port).with_options(self.options.clone()))?;
        publisher.initialize(self.context.as_ref())?;

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let payload = Arc::clone(&self.payload);
        let published = Arc::clone(&self.published);
        let interval = self.interval;
        let port = self.port;

        let spawned = thread::Builder::new()
            .name("ctrlink-heartbeat-publisher".to_string())
            .spawn(move || {
                debug!("[HEARTBEAT] Publisher started on port {}", port);
                while running.load(Ordering::Acquire) {
                    let message = payload.lock().clone();
                    match publisher.publish(&message) {
                        Ok(true) => {
                            published.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(false) => {}
                        Err(e) => warn!("[HEARTBEAT] Failed to publish on port {}: {}", port, e),
                    }
                    thread::sleep(interval);
                }
                publisher.destroy();
                debug!("[HEARTBEAT] Publisher stopped on port {}", port);
            });

        match spawned {
            Ok(thread) => {
                self.thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(SessionError::Thread(format!("heartbeat publisher: {}", e)))
            }
        }
    }

    /// Stop publishing and release the port
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for HeartbeatPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}
