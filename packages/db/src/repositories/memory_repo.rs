//! In-process job store.

use std::collections::HashMap;

use chrono::Utc;
use queue_core::{Change, Job, JobId, JobState, JobStore, JobType, StoreError, TransitionError};
use tokio::sync::RwLock;

use crate::locks::KeyedLocks;

/// Job store kept in process memory.
///
/// Not durable; intended for tests and local development. Provides the same
/// per-job serialization guarantees as [`super::SurrealJobStore`].
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    locks: KeyedLocks,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    async fn create(&self, job_type: JobType, payload: serde_json::Value) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;

        let mut id = JobId::new();
        while jobs.contains_key(&id) {
            id = JobId::new();
        }

        let job = Job::new(id, job_type, payload);
        jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.state() == state)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn update<F>(&self, id: JobId, mut mutation: F) -> Result<Job, StoreError>
    where
        F: FnMut(&mut Job) -> Result<Change, TransitionError> + Send,
    {
        let _guard = self.locks.lock(id).await;

        let current = self.get(id).await?;
        let mut next = current.clone();
        if mutation(&mut next)? == Change::Unchanged {
            return Ok(current);
        }
        next.version = current.version + 1;
        next.touch(Utc::now());

        self.jobs.write().await.insert(id, next.clone());
        Ok(next)
    }
}
