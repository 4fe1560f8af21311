// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ server-side socket patterns

pub mod pub_socket;
pub mod rep;

pub use pub_socket::ZmqPub;
pub use rep::ZmqRep;
