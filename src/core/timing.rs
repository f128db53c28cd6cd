//! Retry backoff schedule.
//!
//! Kept free of I/O so the schedule can be checked without a network.

use std::time::Duration;

/// Largest exponent honoured by [`backoff_delay`]; later attempts plateau.
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Wait before retrying after the zero-based `attempt` failed: `2^attempt`
/// seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(MAX_BACKOFF_EXPONENT))
}

/// Wait scheduled after `attempt` when the budget is `max_attempts`, or
/// `None` when no retry follows.
pub fn retry_delay(attempt: u32, max_attempts: u32) -> Option<Duration> {
    (attempt + 1 < max_attempts).then(|| backoff_delay(attempt))
}
