//! Exponential-backoff retry decorator for fallible remote calls.
//!
//! # Responsibility
//! - Re-invoke an operation after retriable failures, waiting
//!   `base_delay * 2^attempt_index` between tries.
//! - Surface fatal failures immediately and the last error after the final
//!   attempt.
//!
//! # Invariants
//! - The operation runs at least once and at most `max_attempts` times.
//! - Retriability is decided by the error value itself ([`Retriable`]),
//!   never by inspecting message text.

use log::warn;
use std::fmt::Display;
use std::time::Duration;

/// Errors that can say whether another attempt may succeed.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

/// Retry limits and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries including the first; values below 1 behave as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay after the failed attempt with zero-based index `attempt_index`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `operation` under `policy`, sleeping the current thread between
/// retriable failures.
pub fn with_retry<T, E, F>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    E: Retriable + Display,
    F: FnMut() -> Result<T, E>,
{
    with_retry_using(policy, operation, std::thread::sleep)
}

/// Same as [`with_retry`] with an injectable sleep function.
pub fn with_retry_using<T, E, F, S>(
    policy: &RetryPolicy,
    mut operation: F,
    mut sleep: S,
) -> Result<T, E>
where
    E: Retriable + Display,
    F: FnMut() -> Result<T, E>,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt_index = 0;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() && attempt_index + 1 < max_attempts => {
                let delay = policy.delay_for(attempt_index);
                warn!(
                    "event=retry module=retry status=retrying attempt={} max_attempts={} delay_ms={} error={}",
                    attempt_index + 1,
                    max_attempts,
                    delay.as_millis(),
                    err
                );
                sleep(delay);
                attempt_index += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
