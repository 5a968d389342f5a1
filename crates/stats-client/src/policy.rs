//! Retry budgets and backoff delays.

use std::time::Duration;

pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
pub const DEFAULT_MAX_TRANSIENT_FAILURES: u32 = 3;
pub const MAX_RATE_LIMIT_DELAY_MS: u64 = 30_000;

/// Two independent retry budgets: one for 429 responses, one for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_rate_limit_retries: u32,
    pub backoff_base: Duration,
    pub max_transient_failures: u32,
    /// Upper bound for rate-limit waits, including server-supplied `Retry-After`.
    pub max_rate_limit_delay: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_rate_limit_retries: u32,
        backoff_base_ms: u64,
        max_transient_failures: u32,
    ) -> Self {
        Self {
            max_rate_limit_retries,
            backoff_base: Duration::from_millis(backoff_base_ms),
            max_transient_failures,
            max_rate_limit_delay: Duration::from_millis(MAX_RATE_LIMIT_DELAY_MS),
        }
    }

    /// Wait before the next attempt after the `attempt`-th 429 (zero-based).
    pub fn rate_limit_delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let ms = match retry_after_secs {
            Some(secs) => secs.saturating_mul(1000),
            None => exponential(self.backoff_base, attempt),
        };
        Duration::from_millis(ms).min(self.max_rate_limit_delay)
    }

    /// Wait after a transient failure; `failures` counts the one just seen.
    pub fn failure_delay(&self, failures: u32) -> Duration {
        Duration::from_millis(exponential(self.backoff_base, failures))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RATE_LIMIT_RETRIES,
            DEFAULT_BACKOFF_BASE_MS,
            DEFAULT_MAX_TRANSIENT_FAILURES,
        )
    }
}

fn exponential(base: Duration, exponent: u32) -> u64 {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    base_ms.saturating_mul(1_u64 << exponent.min(32))
}

/// Counters for one logical request. Each transition returns a new state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub rate_limit_attempts: u32,
    pub failure_attempts: u32,
}

impl RetryState {
    /// Both budgets gate the same loop.
    pub fn can_attempt(&self, policy: &RetryPolicy) -> bool {
        self.rate_limit_attempts <= policy.max_rate_limit_retries
            && self.failure_attempts < policy.max_transient_failures
    }

    /// True when the current 429 was the last one the policy allows.
    pub fn rate_limit_exhausted(&self, policy: &RetryPolicy) -> bool {
        self.rate_limit_attempts >= policy.max_rate_limit_retries
    }

    pub fn failures_remaining(&self, policy: &RetryPolicy) -> bool {
        self.failure_attempts < policy.max_transient_failures
    }

    #[must_use]
    pub fn rate_limited(self) -> Self {
        Self {
            rate_limit_attempts: self.rate_limit_attempts + 1,
            ..self
        }
    }

    #[must_use]
    pub fn failed(self) -> Self {
        Self {
            failure_attempts: self.failure_attempts + 1,
            ..self
        }
    }

    /// One-based number of the attempt about to be made.
    pub fn attempt(&self) -> u32 {
        self.rate_limit_attempts + self.failure_attempts + 1
    }
}
