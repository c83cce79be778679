//! Exponential backoff with jitter
//!
//! The nominal delay after the n-th consecutive failure is
//! `min(max, base * 2^(n-1))`; the actual delay scales it by a random
//! factor in `[1 - jitter, 1 + jitter]`. A server `Retry-After` hint
//! raises the delay to at least the hint.
//!
//! Deadlines use `tokio::time::Instant` so paused-clock tests can step
//! through them.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use cadence_core::config::BackoffConfig;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Attempts per request before the failure is reported
    pub max_attempts: u32,
    /// Relative jitter, between 0.0 and 1.0
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(8),
            max_attempts: 5,
            jitter: 0.25,
        }
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            base: config.base(),
            max: config.max(),
            max_attempts: config.max_attempts.max(1),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

impl BackoffPolicy {
    /// Delay before jitter after `failures` consecutive failures
    pub fn nominal_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Nominal delay scaled by a random jitter factor
    pub fn jittered_delay(&self, failures: u32) -> Duration {
        let nominal = self.nominal_delay(failures);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        nominal.mul_f64(factor)
    }
}

/// Consecutive-failure state of one collection
#[derive(Debug)]
pub struct SyncBackoff {
    policy: BackoffPolicy,
    failures: u32,
    until: Option<Instant>,
}

impl SyncBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            until: None,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn failure_count(&self) -> u32 {
        self.failures
    }

    /// Deadline before which no attempt may start
    pub fn backoff_until(&self) -> Option<Instant> {
        self.until
    }

    pub fn is_backing_off(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| until > now)
    }

    /// Register a failure and return the delay now in force
    pub fn record_failure(&mut self, retry_after: Option<Duration>) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let mut delay = self.policy.jittered_delay(self.failures);
        if let Some(hint) = retry_after {
            delay = delay.max(hint);
        }
        self.until = Some(Instant::now() + delay);
        delay
    }

    /// Clear the failure count and any pending deadline
    pub fn reset(&mut self) {
        self.failures = 0;
        self.until = None;
    }
}
