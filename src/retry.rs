//! Retry and backoff policy.

use std::time::Duration;

/// How many attempts a request gets and how long to wait between them.
///
/// The wait before attempt `n + 1` is `backoff_base * backoff_growth^n`.
/// Retries are bounded by attempt count, not by elapsed time.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_growth: f64,
    /// How long a failed endpoint stays out of rotation.
    pub quarantine: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_growth: f64) -> Self {
        Self {
            max_attempts,
            backoff_base,
            backoff_growth,
            quarantine: Duration::from_secs(30),
        }
    }

    /// Set the quarantine duration.
    pub fn quarantine(mut self, quarantine: Duration) -> Self {
        self.quarantine = quarantine;
        self
    }

    /// Wait after failed attempt `attempt` (zero-based).
    pub fn wait(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.backoff_growth.powi(exponent);
        if !factor.is_finite() {
            return Duration::MAX;
        }
        let nanos = (self.backoff_base.as_nanos() as f64 * factor).round();
        if nanos >= u64::MAX as f64 {
            return Duration::MAX;
        }
        Duration::from_nanos(nanos as u64)
    }

    /// Whether another attempt follows `attempt`.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), 2.0)
    }
}
