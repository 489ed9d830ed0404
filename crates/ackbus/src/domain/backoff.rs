//! Reconnect backoff for the change-feed watcher.
//!
//! Exponential from `base_delay`, capped at `max_delay`, each delay scaled
//! by a random factor in `[1 - jitter, 1 + jitter]`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for reopening a broken change feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// First retry delay.
    pub base_delay: Duration,
    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before the watcher halts.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Relative jitter, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_attempts: Some(20),
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// Whether `failures` consecutive failures exhaust the policy.
    #[must_use]
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

/// Backoff state for one watcher.
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            current: policy.base_delay,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.current;
        let next = self.current.checked_mul(2).unwrap_or(self.policy.max_delay);
        self.current = next.min(self.policy.max_delay);
        apply_jitter(delay, self.policy.jitter)
    }

    /// A reopen went through. Clears the failure count but keeps the grown
    /// delay, so a feed that flaps still backs off.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Back to the base delay after a healthy feed.
    pub fn reset(&mut self) {
        self.current = self.policy.base_delay;
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the policy gives up at the current failure count.
    pub fn is_exhausted(&self) -> bool {
        self.policy.is_exhausted(self.failures)
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    let jitter = jitter.clamp(0.0, 1.0);
    if jitter == 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
    delay.mul_f64(factor)
}
