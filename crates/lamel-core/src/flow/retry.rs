//! Retry decision and backoff computation for step execution.
//!
//! Stateless: all logic is in associated functions that take configuration as
//! parameters. The executor tracks the attempt counter.

use std::time::Duration;

use lamel_types::flow::{RetryBackoff, RetryConfig};

/// Maximum delay between attempts regardless of backoff growth (5 minutes).
pub const MAX_RETRY_DELAY_SECS: u64 = 300;

/// Stateless retry policy for step failures.
pub struct RetryPolicy;

impl RetryPolicy {
    /// Determine whether a retry should be attempted.
    ///
    /// Returns `true` if `attempt` is less than `config.max_attempts`.
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(config: &RetryConfig, attempt: u32) -> bool {
        attempt < config.max_attempts
    }

    /// Compute the delay to wait before the next attempt.
    ///
    /// `attempt` is the 1-based attempt that just failed:
    /// - **Fixed**: always `delay_secs`.
    /// - **Exponential**: `delay_secs * 2^(attempt - 1)`, capped at
    ///   [`MAX_RETRY_DELAY_SECS`].
    pub fn delay(config: &RetryConfig, attempt: u32) -> Duration {
        let secs = match config.backoff {
            RetryBackoff::Fixed => config.delay_secs,
            RetryBackoff::Exponential => {
                let factor = 1u64 << attempt.saturating_sub(1).min(32);
                config.delay_secs.saturating_mul(factor)
            }
        };
        Duration::from_secs(secs.min(MAX_RETRY_DELAY_SECS))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
