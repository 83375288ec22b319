#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{Coordinator, CoordinatorConfig};
use db::MemoryJobStore;
use queue_core::{
    Change, DispatchError, DispatchPublisher, Job, JobId, JobState, JobStore, JobType, RetryPolicy,
    StoreError, TransitionError,
};

/// Publisher double that records what it sent and can be told to fail or stall.
#[derive(Clone, Default)]
pub struct TestPublisher {
    state: Arc<PublisherState>,
}

#[derive(Default)]
struct PublisherState {
    failures_left: AtomicU32,
    fail_always: AtomicBool,
    delay_ms: AtomicU64,
    attempts: AtomicU32,
    sent: Mutex<Vec<JobId>>,
}

impl TestPublisher {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn failing_first(n: u32) -> Self {
        let publisher = Self::default();
        publisher.state.failures_left.store(n, Ordering::SeqCst);
        publisher
    }

    pub fn always_failing() -> Self {
        let publisher = Self::default();
        publisher.set_failing(true);
        publisher
    }

    pub fn stalling(delay: Duration) -> Self {
        let publisher = Self::default();
        publisher
            .state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        publisher
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.fail_always.store(failing, Ordering::SeqCst);
    }

    /// Every call, successful or not.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<JobId> {
        self.state.sent.lock().unwrap().clone()
    }
}

impl DispatchPublisher for TestPublisher {
    async fn dispatch(&self, job: &Job) -> Result<(), DispatchError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.state.fail_always.load(Ordering::SeqCst) {
            return Err(DispatchError::Publish("broker unavailable".to_string()));
        }
        let pending_failure = self
            .state
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if pending_failure {
            return Err(DispatchError::Publish("broker unavailable".to_string()));
        }

        self.state.sent.lock().unwrap().push(job.id);
        Ok(())
    }
}

/// Memory store whose writes can be switched to fail.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryJobStore,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    read_delay_ms: AtomicU64,
}

impl FaultyStore {
    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn stall_reads(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl JobStore for FaultyStore {
    async fn create(&self, job_type: JobType, payload: serde_json::Value) -> Result<Job, StoreError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("disk on fire".to_string()));
        }
        self.inner.create(job_type, payload).await
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.list().await
    }

    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>, StoreError> {
        self.inner.list_by_state(state).await
    }

    async fn update<F>(&self, id: JobId, mutation: F) -> Result<Job, StoreError>
    where
        F: FnMut(&mut Job) -> Result<Change, TransitionError> + Send,
    {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("disk on fire".to_string()));
        }
        self.inner.update(id, mutation).await
    }
}

/// Retry policy with millisecond delays so tests never wait on backoff.
pub fn quick_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        chrono::Duration::milliseconds(1),
        chrono::Duration::milliseconds(1),
        max_attempts,
    )
}

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
        .with_store_timeout(Duration::from_secs(2))
        .with_dispatch_timeout(Duration::from_millis(200))
        .with_retry_policy(quick_retries(3))
        .with_stuck_threshold(Duration::from_secs(30))
}

pub fn coordinator(
    publisher: TestPublisher,
) -> Coordinator<MemoryJobStore, TestPublisher> {
    Coordinator::new(MemoryJobStore::new(), publisher, test_config())
}

pub fn faulty_coordinator(
    publisher: TestPublisher,
) -> Coordinator<FaultyStore, TestPublisher> {
    Coordinator::new(FaultyStore::default(), publisher, test_config())
}

/// A point in time after every quick retry is due.
pub fn later() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + chrono::Duration::seconds(1)
}
