// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Socket lifecycle shared by every ZMQ role
//!
//! A [`SocketLifecycle`] owns at most one live socket. The context under it is
//! either created here ([`ContextOwnership::Owned`]) or adopted from the caller
//! ([`ContextOwnership::Borrowed`]); only an owned context is released on
//! teardown.

use crate::common::{Endpoint, SocketOptions, TransportError, TransportResult};
use ctrlink_observability::SharedLogSink;

/// Messaging pattern of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketRole {
    Req,
    Rep,
    Pub,
    Sub,
}

impl SocketRole {
    pub fn socket_type(&self) -> zmq::SocketType {
        match self {
            Self::Req => zmq::REQ,
            Self::Rep => zmq::REP,
            Self::Pub => zmq::PUB,
            Self::Sub => zmq::SUB,
        }
    }

    /// Log tag, e.g. `ZMQ-REQ`
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Req => "ZMQ-REQ",
            Self::Rep => "ZMQ-REP",
            Self::Pub => "ZMQ-PUB",
            Self::Sub => "ZMQ-SUB",
        }
    }

    /// Servers and publishers bind; clients and subscribers connect
    pub fn binds(&self) -> bool {
        matches!(self, Self::Rep | Self::Pub)
    }

    fn is_broadcast(&self) -> bool {
        matches!(self, Self::Pub | Self::Sub)
    }
}

/// Who is responsible for releasing the context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOwnership {
    /// Created by this lifecycle, released on destroy
    Owned,
    /// Supplied by the caller, never released here
    Borrowed,
}

/// Creates, rebuilds and tears down one role's socket
pub struct SocketLifecycle {
    role: SocketRole,
    endpoint: Endpoint,
    options: SocketOptions,
    context: Option<zmq::Context>,
    ownership: ContextOwnership,
    socket: Option<zmq::Socket>,
    sink: SharedLogSink,
}

impl SocketLifecycle {
    pub fn new(
        role: SocketRole,
        endpoint: Endpoint,
        options: SocketOptions,
        sink: SharedLogSink,
    ) -> Self {
        Self {
            role,
            endpoint,
            options,
            context: None,
            ownership: ContextOwnership::Owned,
            socket: None,
            sink,
        }
    }

    /// Create the socket, adopting `context` if given or creating a private one
    ///
    /// Any socket already live is destroyed first.
    pub fn initialize(&mut self, context: Option<&zmq::Context>) -> TransportResult<()> {
        self.destroy();

        match context {
            Some(shared) => {
                self.context = Some(shared.clone());
                self.ownership = ContextOwnership::Borrowed;
            }
            None => {
                self.context = Some(zmq::Context::new());
                self.ownership = ContextOwnership::Owned;
            }
        }

        self.open_socket()
    }

    /// Replace the socket with a fresh one on the current context
    ///
    /// Used to recover from a socket stuck in the wrong request/reply state.
    pub fn reinitialize(&mut self) -> TransportResult<()> {
        self.close_socket();
        if self.context.is_none() {
            self.context = Some(zmq::Context::new());
            self.ownership = ContextOwnership::Owned;
        }
        self.open_socket()
    }

    /// Close the socket and release an owned context
    ///
    /// Safe to call repeatedly and before `initialize`.
    pub fn destroy(&mut self) {
        self.close_socket();
        if self.ownership == ContextOwnership::Owned {
            self.context = None;
        }
    }

    /// The live socket
    pub fn socket(&self) -> TransportResult<&zmq::Socket> {
        self.socket.as_ref().ok_or_else(|| {
            TransportError::NotInitialized(format!("{} socket for {}", self.role.tag(), self.endpoint))
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.socket.is_some()
    }

    pub fn ownership(&self) -> ContextOwnership {
        self.ownership
    }

    /// Context the socket lives on, if any
    pub fn context(&self) -> Option<&zmq::Context> {
        self.context.as_ref()
    }

    pub fn role(&self) -> SocketRole {
        self.role
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Address the socket connects to or binds
    pub fn address(&self) -> String {
        if self.role.binds() {
            self.endpoint.bind_address()
        } else {
            self.endpoint.connect_address()
        }
    }

    fn open_socket(&mut self) -> TransportResult<()> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| TransportError::InitializationFailed("no context".to_string()))?;

        let socket = context.socket(self.role.socket_type()).map_err(|e| {
            TransportError::InitializationFailed(format!("{} socket: {}", self.role.tag(), e))
        })?;

        self.apply_options(&socket)?;

        let address = self.address();
        if self.role.binds() {
            socket
                .bind(&address)
                .map_err(|e| TransportError::BindFailed(format!("{}: {}", address, e)))?;
            self.sink.info(&format!("Listening on {}", address));
        } else {
            socket
                .connect(&address)
                .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", address, e)))?;
            self.sink.info(&format!("Connecting to socket at {}", address));
        }

        self.socket = Some(socket);
        Ok(())
    }

    fn apply_options(&self, socket: &zmq::Socket) -> TransportResult<()> {
        if self.options.tcp_keepalive {
            socket.set_tcp_keepalive(1)?;
            socket.set_tcp_keepalive_idle(self.options.tcp_keepalive_idle_secs)?;
            socket.set_tcp_keepalive_intvl(self.options.tcp_keepalive_interval_secs)?;
            socket.set_tcp_keepalive_cnt(self.options.tcp_keepalive_count)?;
        }

        if self.role.is_broadcast() {
            socket.set_sndhwm(self.options.high_water_mark)?;
            socket.set_linger(self.options.linger_ms)?;
        }

        if self.role == SocketRole::Sub {
            socket.set_subscribe(b"")?;
        }

        Ok(())
    }

    fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            // Pending requests/replies are meaningless once the socket is gone
            if !self.role.is_broadcast() {
                if let Err(e) = socket.set_linger(0) {
                    tracing::debug!("[{}] set_linger(0) before close failed: {}", self.role.tag(), e);
                }
            }
            drop(socket);
            tracing::debug!("[{}] Socket for {} closed", self.role.tag(), self.endpoint);
        }
    }
}

impl Drop for SocketLifecycle {
    fn drop(&mut self) {
        self.destroy();
    }
}
