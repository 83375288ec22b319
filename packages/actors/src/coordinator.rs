//! Job lifecycle coordinator.
//!
//! Owns the job state machine. Every state change goes through
//! [`JobStore::update`], so concurrent submissions, completion reports, and
//! retry-lane dispatches for one job are serialized by the store while
//! different jobs proceed independently. No job state is held in memory
//! between calls.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use queue_core::{
    Change, DispatchError, DispatchPublisher, Job, JobEvent, JobId, JobState, JobStore, JobType,
    Outcome, StoreError, TransitionError,
};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::CoordinatorConfig;

/// Errors surfaced by coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Job not found: {0}")]
    NotFound(JobId),
    #[error("Conflict: {0}")]
    Conflict(#[from] TransitionError),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CoordinatorError::NotFound(id),
            StoreError::Conflict(e) => CoordinatorError::Conflict(e),
            StoreError::Persistence(msg) => CoordinatorError::Persistence(msg),
        }
    }
}

/// Counts from one pass of the dispatch retry lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// `CREATED` jobs examined.
    pub scanned: usize,
    pub dispatched: usize,
    /// Dispatch failed again and another attempt was scheduled.
    pub rescheduled: usize,
    /// Dispatch failed on the last allowed attempt; the job is now `FAILED`.
    pub exhausted: usize,
    /// Due jobs that had left `CREATED` before their turn came.
    pub skipped: usize,
    /// Jobs whose attempt could not be read or recorded.
    pub errors: usize,
}

impl ReconcileReport {
    /// True when the pass found nothing due.
    pub fn is_idle(&self) -> bool {
        self.dispatched + self.rescheduled + self.exhausted + self.skipped + self.errors == 0
    }
}

/// Result of one dispatch attempt as recorded in the store.
#[derive(Debug)]
enum Attempt {
    Dispatched(Job),
    Rescheduled(Job),
    Exhausted(Job),
    /// The job moved on concurrently; nothing was recorded.
    Skipped(Job),
}

impl Attempt {
    fn into_job(self) -> Job {
        match self {
            Attempt::Dispatched(job)
            | Attempt::Rescheduled(job)
            | Attempt::Exhausted(job)
            | Attempt::Skipped(job) => job,
        }
    }
}

struct Inner<S, P> {
    store: S,
    publisher: P,
    config: CoordinatorConfig,
    events: broadcast::Sender<JobEvent>,
}

/// Coordinates the job store and dispatch publisher.
///
/// Cheap to clone; clones share the same store, publisher, and event channel.
pub struct Coordinator<S, P> {
    inner: Arc<Inner<S, P>>,
}

impl<S, P> Clone for Coordinator<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: JobStore, P: DispatchPublisher> Coordinator<S, P> {
    pub fn new(store: S, publisher: P, config: CoordinatorConfig) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                store,
                publisher,
                config,
                events,
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Accept a new job: validate, persist as `CREATED`, and attempt the
    /// first dispatch.
    ///
    /// Succeeds once the job is durable. A failed dispatch is recorded on the
    /// job and left to the reconciler; it never fails the submission.
    pub async fn submit(&self, job_type: &str, payload: Option<Value>) -> Result<Job, CoordinatorError> {
        if job_type.trim().is_empty() {
            return Err(CoordinatorError::InvalidRequest("job type is required".into()));
        }
        let payload = match payload {
            None | Some(Value::Null) => {
                return Err(CoordinatorError::InvalidRequest("payload is required".into()));
            }
            Some(payload) => payload,
        };

        let job_type = match JobType::parse(job_type) {
            JobType::Unknown => {
                tracing::warn!(requested = job_type, "Unrecognized job type, accepting as UNKNOWN");
                JobType::Unknown
            }
            known => known,
        };

        let job = self.bounded(self.inner.store.create(job_type, payload)).await?;
        tracing::info!(job_id = %job.id, job_type = %job.job_type, "Job created");
        self.emit(JobEvent::JobCreated {
            job: job.clone(),
            timestamp: job.created_at,
        });

        match self.dispatch_and_record(job.clone()).await {
            Ok(attempt) => Ok(attempt.into_job()),
            Err(e) => {
                // The job is durable in CREATED; the reconciler's stuck-job
                // scan will dispatch it.
                tracing::error!(job_id = %job.id, error = %e, "Failed to record dispatch attempt");
                Ok(job)
            }
        }
    }

    pub async fn get(&self, id: JobId) -> Result<Job, CoordinatorError> {
        self.bounded(self.inner.store.get(id)).await
    }

    pub async fn list(&self) -> Result<Vec<Job>, CoordinatorError> {
        self.bounded(self.inner.store.list()).await
    }

    /// Apply a worker's terminal report.
    ///
    /// Accepted from any non-terminal state. Repeating the stored outcome is
    /// a successful no-op; a different outcome for a terminal job is a
    /// [`CoordinatorError::Conflict`] and leaves the job untouched.
    pub async fn apply_completion(&self, id: JobId, outcome: Outcome) -> Result<Job, CoordinatorError> {
        let now = Utc::now();
        let mut change = Change::Unchanged;

        let job = self
            .bounded(self.inner.store.update(id, |job| {
                change = job.apply_outcome(&outcome, now)?;
                Ok(change)
            }))
            .await
            .inspect_err(|e| {
                if let CoordinatorError::Conflict(conflict) = e {
                    tracing::warn!(job_id = %id, error = %conflict, "Rejected conflicting completion report");
                }
            })?;

        if change == Change::Applied {
            tracing::info!(job_id = %id, state = %job.state(), "Job finished");
            self.emit(JobEvent::JobFinished {
                job_id: id,
                state: job.state(),
                timestamp: job.updated_at,
            });
        } else {
            tracing::debug!(job_id = %id, state = %job.state(), "Duplicate completion report");
        }
        Ok(job)
    }

    /// Record a worker heartbeat, moving a waiting job to `IN_PROGRESS`.
    ///
    /// Heartbeats for jobs already running or finished are no-ops.
    pub async fn report_progress(&self, id: JobId, worker_id: &str) -> Result<Job, CoordinatorError> {
        if worker_id.trim().is_empty() {
            return Err(CoordinatorError::InvalidRequest("worker id is required".into()));
        }

        let now = Utc::now();
        let mut change = Change::Unchanged;
        let job = self
            .bounded(self.inner.store.update(id, |job| {
                change = job.mark_in_progress(worker_id, now);
                Ok(change)
            }))
            .await?;

        if change == Change::Applied {
            tracing::info!(job_id = %id, worker_id, "Job started");
            self.emit(JobEvent::JobStarted {
                job_id: id,
                worker_id: worker_id.to_string(),
                timestamp: now,
            });
        }
        Ok(job)
    }

    /// One pass of the dispatch retry lane.
    ///
    /// Dispatches every `CREATED` job whose retry is due at `now`, plus jobs
    /// that never recorded an attempt and are older than the stuck threshold.
    /// Jobs are attempted concurrently; each is re-read first and skipped if
    /// it has left `CREATED`.
    pub async fn reconcile_once(&self, now: DateTime<Utc>) -> Result<ReconcileReport, CoordinatorError> {
        let candidates = self
            .bounded(self.inner.store.list_by_state(JobState::Created))
            .await?;
        let stuck_after = self.inner.config.stuck_after();

        let due: Vec<JobId> = candidates
            .iter()
            .filter(|job| job.is_dispatch_due(now, stuck_after))
            .map(|job| job.id)
            .take(self.inner.config.batch_limit)
            .collect();

        let mut report = ReconcileReport {
            scanned: candidates.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let results = join_all(due.iter().map(|id| self.retry_dispatch(*id))).await;
        for (id, result) in due.iter().zip(results) {
            match result {
                Ok(Attempt::Dispatched(_)) => report.dispatched += 1,
                Ok(Attempt::Rescheduled(_)) => report.rescheduled += 1,
                Ok(Attempt::Exhausted(_)) => report.exhausted += 1,
                Ok(Attempt::Skipped(_)) => report.skipped += 1,
                Err(CoordinatorError::NotFound(_)) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Retry dispatch failed");
                    report.errors += 1;
                }
            }
        }

        tracing::debug!(?report, "Reconcile pass finished");
        Ok(report)
    }

    async fn retry_dispatch(&self, id: JobId) -> Result<Attempt, CoordinatorError> {
        let job = self.bounded(self.inner.store.get(id)).await?;
        if job.state() != JobState::Created {
            tracing::debug!(job_id = %id, state = %job.state(), "Job left CREATED, skipping retry");
            return Ok(Attempt::Skipped(job));
        }
        self.dispatch_and_record(job).await
    }

    /// Publish `job` and record the attempt through the store.
    async fn dispatch_and_record(&self, job: Job) -> Result<Attempt, CoordinatorError> {
        let id = job.id;

        match self.publish(&job).await {
            Ok(()) => {
                let now = Utc::now();
                let mut change = Change::Unchanged;
                let updated = self
                    .bounded(self.inner.store.update(id, |j| {
                        change = j.mark_dispatched(now);
                        Ok(change)
                    }))
                    .await?;

                if change == Change::Unchanged {
                    tracing::debug!(job_id = %id, state = %updated.state(), "Dispatch confirmed after job moved on");
                    return Ok(Attempt::Skipped(updated));
                }

                tracing::info!(job_id = %id, attempt = updated.dispatch_attempts, "Job dispatched");
                self.emit(JobEvent::JobDispatched {
                    job_id: id,
                    attempt: updated.dispatch_attempts,
                    timestamp: now,
                });
                Ok(Attempt::Dispatched(updated))
            }
            Err(err) => {
                let now = Utc::now();
                let message = err.to_string();
                let policy = &self.inner.config.retry_policy;
                let mut change = Change::Unchanged;
                let updated = self
                    .bounded(self.inner.store.update(id, |j| {
                        change = j.record_dispatch_failure(now, &message, policy);
                        Ok(change)
                    }))
                    .await?;

                if change == Change::Unchanged {
                    return Ok(Attempt::Skipped(updated));
                }

                let will_retry = !updated.is_terminal();
                tracing::warn!(
                    job_id = %id,
                    attempt = updated.dispatch_attempts,
                    will_retry,
                    error = %message,
                    "Dispatch failed"
                );
                self.emit(JobEvent::DispatchFailed {
                    job_id: id,
                    attempt: updated.dispatch_attempts,
                    error: message,
                    will_retry,
                    timestamp: now,
                });

                if will_retry {
                    Ok(Attempt::Rescheduled(updated))
                } else {
                    tracing::warn!(job_id = %id, "Dispatch attempts exhausted, job failed");
                    self.emit(JobEvent::JobFinished {
                        job_id: id,
                        state: JobState::Failed,
                        timestamp: now,
                    });
                    Ok(Attempt::Exhausted(updated))
                }
            }
        }
    }

    /// Publish with the dispatch timeout. A timeout is reported as a failed
    /// attempt even though the message may have been delivered.
    async fn publish(&self, job: &Job) -> Result<(), DispatchError> {
        let timeout = self.inner.config.dispatch_timeout;
        match tokio::time::timeout(timeout, self.inner.publisher.dispatch(job)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(job_id = %job.id, timeout_ms = timeout.as_millis() as u64, "Dispatch timed out, outcome unknown");
                Err(DispatchError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Run a store call under the store timeout.
    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, CoordinatorError> {
        let timeout = self.inner.config.store_timeout;
        match tokio::time::timeout(timeout, op).await {
            Ok(result) => result.map_err(CoordinatorError::from),
            Err(_) => Err(CoordinatorError::Persistence(format!(
                "store operation timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}
