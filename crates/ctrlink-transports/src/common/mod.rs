// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Common types and utilities for all transports

pub mod config;
pub mod error;
pub mod preempt;

pub use config::{ClientConfig, Endpoint, ServerConfig, SocketOptions, DEFAULT_CALL_TIMEOUT};
pub use error::{ErrorCode, TransportError, TransportResult};
pub use preempt::{Preempt, PreemptFlags, SharedPreempt};
