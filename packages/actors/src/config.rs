//! Coordinator tuning.

use std::time::Duration;

use queue_core::RetryPolicy;

/// Timeouts, retry policy, and retry-lane cadence for a [`crate::Coordinator`].
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Bound on every store call. Expiry is reported as a persistence failure.
    pub store_timeout: Duration,
    /// Bound on every publish. Expiry is an ambiguous outcome and is retried.
    pub dispatch_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// How often the reconciler scans for jobs due a dispatch.
    pub reconcile_interval: Duration,
    /// Age after which a `CREATED` job with no recorded dispatch attempt is
    /// treated as orphaned and dispatched by the reconciler.
    pub stuck_threshold: Duration,
    /// Maximum jobs dispatched per reconcile pass.
    pub batch_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            dispatch_timeout: Duration::from_secs(5),
            retry_policy: RetryPolicy::standard(),
            reconcile_interval: Duration::from_secs(1),
            stuck_threshold: Duration::from_secs(30),
            batch_limit: 100,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    pub fn with_stuck_threshold(mut self, threshold: Duration) -> Self {
        self.stuck_threshold = threshold;
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    pub(crate) fn stuck_after(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.stuck_threshold).unwrap_or(chrono::Duration::MAX)
    }
}
