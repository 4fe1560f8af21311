// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cooperative cancellation of blocking waits
//!
//! A blocking call is handed a set of bits; between poll slices it asks its
//! [`Preempt`] source whether any of those bits are raised. The caller decides
//! what each bit means (operator stop, shutdown, ...).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Polled cancellation predicate
pub trait Preempt: Send + Sync {
    /// True if the wait watching `bits` should be abandoned
    fn is_preempted(&self, bits: u32) -> bool;
}

impl<F> Preempt for F
where
    F: Fn(u32) -> bool + Send + Sync,
{
    fn is_preempted(&self, bits: u32) -> bool {
        self(bits)
    }
}

/// Shared handle to a cancellation source
pub type SharedPreempt = Arc<dyn Preempt>;

/// Atomic bitmask cancellation source
///
/// ```
/// use ctrlink_transports::common::{Preempt, PreemptFlags};
///
/// const STOP: u32 = 0b01;
/// let flags = PreemptFlags::new();
/// assert!(!flags.is_preempted(STOP));
/// flags.raise(STOP);
/// assert!(flags.is_preempted(STOP));
/// ```
#[derive(Debug, Default)]
pub struct PreemptFlags {
    bits: AtomicU32,
}

impl PreemptFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `bits`, returning the previous mask
    pub fn raise(&self, bits: u32) -> u32 {
        self.bits.fetch_or(bits, Ordering::SeqCst)
    }

    /// Clear `bits`, returning the previous mask
    pub fn clear(&self, bits: u32) -> u32 {
        self.bits.fetch_and(!bits, Ordering::SeqCst)
    }

    pub fn clear_all(&self) {
        self.bits.store(0, Ordering::SeqCst);
    }

    pub fn current(&self) -> u32 {
        self.bits.load(Ordering::SeqCst)
    }
}

impl Preempt for PreemptFlags {
    fn is_preempted(&self, bits: u32) -> bool {
        self.current() & bits != 0
    }
}
