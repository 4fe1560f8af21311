// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ client-side socket patterns

pub mod framed;
pub mod req;
pub mod sub;

pub use framed::ZmqFramedReq;
pub use req::ZmqReq;
pub use sub::ZmqSub;
