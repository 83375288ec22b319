//! Exponential backoff policy for dispatch retries.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default delay before the first retry.
const DEFAULT_BASE_DELAY_MS: i64 = 500;

/// Default ceiling for a single delay.
const DEFAULT_MAX_DELAY_MS: i64 = 60_000;

/// Default number of dispatch attempts before a job is failed.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Bounded exponential backoff for re-publishing jobs that failed to dispatch.
///
/// The delay after the n-th failed attempt (1-based) is
/// `min(base_delay * 2^(n-1), max_delay)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(with = "millis")]
    pub base_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Total dispatch attempts, including the one made at submission.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::milliseconds(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::milliseconds(DEFAULT_MAX_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl std::fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RetryPolicy(base_delay={}ms, max_delay={}ms, max_attempts={})",
            self.base_delay.num_milliseconds(),
            self.max_delay.num_milliseconds(),
            self.max_attempts
        )
    }
}

impl RetryPolicy {
    /// The default policy: 500ms base, 60s ceiling, 5 attempts.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Faster recovery for latency-sensitive deployments: 100ms base, 5s
    /// ceiling, 3 attempts.
    pub fn aggressive() -> Self {
        Self {
            base_delay: Duration::milliseconds(100),
            max_delay: Duration::seconds(5),
            max_attempts: 3,
        }
    }

    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay to wait after `attempts` failed attempts.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(30);
        let factor = 1i32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Check if another attempt is allowed after `attempts` attempts.
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Every delay the policy would wait before giving up.
    pub fn delay_schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|n| self.delay_for(n)).collect()
    }
}

mod millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::milliseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_ceiling() {
        let policy = RetryPolicy::new(Duration::seconds(1), Duration::seconds(5), 6);
        let delays: Vec<i64> = policy
            .delay_schedule()
            .iter()
            .map(|d| d.num_seconds())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn attempt_cap() {
        let policy = RetryPolicy::aggressive();
        assert!(policy.can_retry(2));
        assert!(!policy.can_retry(3));
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let policy = RetryPolicy::standard();
        assert_eq!(policy.delay_for(u32::MAX), policy.max_delay);
    }
}
