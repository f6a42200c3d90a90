//! Backoff scheduling and circuit-breaker state for loop iterations.
//!
//! The attempt loop itself lives in the loop handler, which owns the
//! iteration body; this module provides the schedule lookup and the
//! consecutive-failure counter it applies between attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::workflow::RetryPolicy;

/// Backoff delay for the given number of attempts already used (1-based).
/// The schedule's last entry is reused once it is exhausted.
pub fn backoff_delay(policy: &RetryPolicy, attempts_used: u32) -> Duration {
    let schedule = &policy.backoff_schedule_ms;
    if schedule.is_empty() {
        return Duration::ZERO;
    }
    let idx = (attempts_used.saturating_sub(1) as usize).min(schedule.len() - 1);
    Duration::from_millis(schedule[idx])
}

/// Consecutive-failure counter for one loop.
///
/// Tracks consecutive failed iterations, not total failures: a single
/// success resets the counter to zero. Once the count crosses the
/// configured threshold the loop halts early.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerState {
    pub consecutive_failures: u32,
}

impl BreakerState {
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failed iteration; returns true when the breaker trips.
    pub fn record_failure(&mut self, threshold: u32) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures >= threshold
    }
}
