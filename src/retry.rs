use std::time::Duration;

use crate::error::Error;

/// Retry behavior for transient streaming failures.
///
/// Applied independently by every watcher and follower; retry counters are
/// never shared between workers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of consecutive failed attempts before giving up
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Upper bound on the delay between retries
    pub max_interval: Duration,
    /// Factor by which the delay grows after each retry
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.initial_interval.is_zero() {
            return Err(Error::InvalidRetryPolicy(
                "initial_interval must be greater than zero",
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(Error::InvalidRetryPolicy(
                "max_interval must be at least initial_interval",
            ));
        }
        if self.multiplier < 1.0 {
            return Err(Error::InvalidRetryPolicy("multiplier must be at least 1.0"));
        }
        Ok(())
    }
}

/// Exponential backoff schedule derived from a [`RetryPolicy`].
#[derive(Debug)]
pub(crate) struct Backoff {
    policy: RetryPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            policy: policy.clone(),
            current: policy.initial_interval,
        }
    }

    /// Returns the next delay and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .mul_f64(self.policy.multiplier)
            .min(self.policy.max_interval);
        delay
    }

    /// Rewinds to the initial interval after a successful attempt.
    pub fn reset(&mut self) {
        self.current = self.policy.initial_interval;
    }
}
