//! Durable job store contract.

use std::future::Future;

use crate::{Change, Job, JobId, JobState, JobType, TransitionError};

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),
    #[error("Conflict: {0}")]
    Conflict(#[from] TransitionError),
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Durable keyed record of jobs; the single source of truth for job state.
///
/// Implementations serialize every `update` for a given id so concurrent
/// mutations of one job never interleave, while updates for different ids
/// proceed independently.
pub trait JobStore: Send + Sync + 'static {
    /// Allocate an id and persist a new job in the `CREATED` state.
    fn create(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<Job, StoreError>> + Send;

    fn get(&self, id: JobId) -> impl Future<Output = Result<Job, StoreError>> + Send;

    /// Snapshot of every job.
    fn list(&self) -> impl Future<Output = Result<Vec<Job>, StoreError>> + Send;

    /// Snapshot of the jobs currently in `state`.
    fn list_by_state(
        &self,
        state: JobState,
    ) -> impl Future<Output = Result<Vec<Job>, StoreError>> + Send;

    /// Apply `mutation` to the stored job under per-job mutual exclusion.
    ///
    /// `Change::Applied` persists the mutated job with a bumped version and a
    /// fresh `updated_at`; `Change::Unchanged` writes nothing and returns the
    /// stored job. A `TransitionError` is returned as `StoreError::Conflict`.
    /// The mutation may run more than once if the store detects a concurrent
    /// writer and retries.
    fn update<F>(
        &self,
        id: JobId,
        mutation: F,
    ) -> impl Future<Output = Result<Job, StoreError>> + Send
    where
        F: FnMut(&mut Job) -> Result<Change, TransitionError> + Send;
}
