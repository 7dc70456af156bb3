//! Retry policy for monitoring queries

use crate::error::AuditError;
use std::time::Duration;

/// Upper bound on attempts when backoff is configured as zero
const ATTEMPT_CAP: u32 = 100;

/// Exponential backoff bounded by a per-call wall-clock budget
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Total budget for one call, sleeps included
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            deadline: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            deadline: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Only unavailable, internal and deadline-exceeded errors are retried
    pub fn should_retry(&self, error: &AuditError) -> bool {
        error.is_transient()
    }

    /// Sleep before retry number `retry` (zero-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(retry as i32);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_backoff
        }
    }

    /// Attempts whose cumulative backoff still fits inside the deadline
    pub fn max_attempts(&self) -> u32 {
        let mut slept = Duration::ZERO;
        let mut attempts = 1;
        while attempts < ATTEMPT_CAP {
            let next = slept + self.backoff_for(attempts - 1);
            if next > self.deadline {
                break;
            }
            slept = next;
            attempts += 1;
        }
        attempts
    }
}
