// src/scheduler/retry.rs

use std::time::Duration;

use crate::exec::AttemptStatus;

/// Decides whether a failed attempt gets relaunched.
///
/// Pure: no state, no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries are enabled for this run.
    pub enabled: bool,
    /// Number of relaunches allowed after the first attempt.
    pub retry_bound: u32,
    /// Pause before a relaunch. Zero means relaunch immediately.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_bound: 1,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_bound(retry_bound: u32) -> Self {
        Self {
            retry_bound,
            ..Self::default()
        }
    }

    /// True iff the attempt did not succeed, retries are enabled, and
    /// `attempt_number` is below the maximum number of attempts.
    pub fn should_retry(&self, attempt_number: u32, status: AttemptStatus) -> bool {
        self.enabled && !status.is_success() && attempt_number < self.max_attempts()
    }

    /// Upper bound on attempts per task.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.retry_bound.saturating_add(1)
        } else {
            1
        }
    }
}
