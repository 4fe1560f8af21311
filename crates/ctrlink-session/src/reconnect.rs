// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Retry with exponential backoff

use crate::error::SessionResult;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound of a single backoff
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff schedule
#[derive(Debug, Clone)]
pub struct ReconnectionStrategy {
    base_backoff: Duration,
    max_backoff: Duration,
    current_attempt: u32,

    /// 0 = retry forever
    max_attempts: u32,
}

impl ReconnectionStrategy {
    /// # Arguments
    /// * `base_backoff` - Wait before the first retry; doubled for every further retry
    /// * `max_attempts` - Maximum retries (0 = infinite)
    pub fn new(base_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            base_backoff,
            max_backoff: MAX_BACKOFF,
            current_attempt: 0,
            max_attempts,
        }
    }

    /// Next wait, or `None` once the retries are used up
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.current_attempt = self.current_attempt.saturating_add(1);

        let factor = 1u32.checked_shl(self.current_attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_backoff.saturating_mul(factor).min(self.max_backoff))
    }

    /// Start over after a success
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn attempt_number(&self) -> u32 {
        self.current_attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_attempts > 0 && self.current_attempt >= self.max_attempts
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `strategy` runs out
///
/// # Example
/// ```no_run
/// use ctrlink_session::{retry_with_backoff, ReconnectionStrategy, SessionOptions, TaskSession};
/// use std::time::Duration;
///
/// let options = SessionOptions::new("127.0.0.1", 11000, 11001);
/// let mut strategy = ReconnectionStrategy::new(Duration::from_millis(500), 3);
/// let session = retry_with_backoff(
///     || TaskSession::bootstrap(options.clone()),
///     &mut strategy,
///     "Task session bootstrap",
/// )?;
/// # Ok::<(), ctrlink_session::SessionError>(())
/// ```
pub fn retry_with_backoff<F, T>(
    mut operation: F,
    strategy: &mut ReconnectionStrategy,
    operation_name: &str,
) -> SessionResult<T>
where
    F: FnMut() -> SessionResult<T>,
{
    loop {
        match operation() {
            Ok(result) => {
                if strategy.attempt_number() > 0 {
                    info!(
                        "[RECONNECT] {} succeeded after {} retries",
                        operation_name,
                        strategy.attempt_number()
                    );
                }
                strategy.reset();
                return Ok(result);
            }
            Err(e) if e.is_retryable() => match strategy.next_backoff() {
                Some(backoff) => {
                    warn!(
                        "[RECONNECT] {} failed (attempt {}): {} - retrying in {:?}",
                        operation_name,
                        strategy.attempt_number(),
                        e,
                        backoff
                    );
                    std::thread::sleep(backoff);
                }
                None => {
                    warn!(
                        "[RECONNECT] {} failed after {} retries - giving up",
                        operation_name,
                        strategy.attempt_number()
                    );
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
    }
}
