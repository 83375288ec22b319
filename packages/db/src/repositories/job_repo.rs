//! SurrealDB-backed job store.

use chrono::Utc;
use queue_core::{Change, Job, JobId, JobState, JobStore, JobType, StoreError, TransitionError};
use serde::{Deserialize, Serialize};

use crate::locks::KeyedLocks;
use crate::{Database, DbConfig, DbError, connect, init_schema};

/// Compare-and-swap rounds before an update gives up on a contended record.
const MAX_WRITE_ROUNDS: usize = 5;

/// Internal record type for SurrealDB.
///
/// The job is kept as JSON text: SurrealDB collapses JSON `null` to NONE,
/// which would drop null results and null members of payloads. `state` and
/// `version` mirror the job so they can be indexed and used as the
/// compare-and-swap guard.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    state: JobState,
    version: i64,
    body: String,
}

impl JobRecord {
    fn from_job(job: &Job) -> Result<Self, DbError> {
        Ok(Self {
            state: job.state(),
            version: job.version as i64,
            body: serde_json::to_string(job)?,
        })
    }

    fn into_job(self) -> Result<Job, DbError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

fn into_jobs(records: Vec<JobRecord>) -> Result<Vec<Job>, DbError> {
    records.into_iter().map(JobRecord::into_job).collect()
}

/// Job store persisting to SurrealDB.
///
/// Same-id updates are serialized in-process by [`KeyedLocks`]; writes are
/// additionally guarded by the record version so a writer in another process
/// is detected and the mutation re-applied to the fresh record.
pub struct SurrealJobStore {
    db: Database,
    locks: KeyedLocks,
}

impl SurrealJobStore {
    /// Wrap an open connection. The schema must already be initialized.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            locks: KeyedLocks::new(),
        }
    }

    /// Connect, initialize the schema, and build a store.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let db = connect(config).await?;
        init_schema(&db).await?;
        Ok(Self::new(db))
    }

    /// The underlying connection.
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn fetch(&self, id: JobId) -> Result<Option<Job>, DbError> {
        let record: Option<JobRecord> = self.db.select(("job", id.to_string())).await?;
        record.map(JobRecord::into_job).transpose()
    }

    async fn insert(&self, job: &Job) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self
            .db
            .create(("job", job.id.to_string()))
            .content(JobRecord::from_job(job)?)
            .await?;

        record
            .ok_or_else(|| DbError::Query("Failed to create job".into()))?
            .into_job()
    }

    /// Write `job` only if the stored version still equals `expected`.
    async fn compare_and_swap(&self, job: &Job, expected: u64) -> Result<bool, DbError> {
        let mut response = self
            .db
            .query(
                "UPDATE type::thing('job', $id) CONTENT $record WHERE version = $expected RETURN AFTER",
            )
            .bind(("id", job.id.to_string()))
            .bind(("record", JobRecord::from_job(job)?))
            .bind(("expected", expected as i64))
            .await?;

        let records: Vec<JobRecord> = response.take(0)?;
        Ok(!records.is_empty())
    }
}

impl JobStore for SurrealJobStore {
    async fn create(&self, job_type: JobType, payload: serde_json::Value) -> Result<Job, StoreError> {
        let job = Job::new(JobId::new(), job_type, payload);
        let created = self.insert(&job).await?;
        tracing::debug!(job_id = %created.id, "Persisted new job");
        Ok(created)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.fetch(id).await?.ok_or(StoreError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let records: Vec<JobRecord> = self.db.select("job").await.map_err(DbError::from)?;
        Ok(into_jobs(records)?)
    }

    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>, StoreError> {
        let mut response = self
            .db
            .query("SELECT * FROM job WHERE state = $state")
            .bind(("state", state))
            .await
            .map_err(DbError::from)?;

        let records: Vec<JobRecord> = response.take(0).map_err(DbError::from)?;
        Ok(into_jobs(records)?)
    }

    async fn update<F>(&self, id: JobId, mut mutation: F) -> Result<Job, StoreError>
    where
        F: FnMut(&mut Job) -> Result<Change, TransitionError> + Send,
    {
        let _guard = self.locks.lock(id).await;

        for round in 0..MAX_WRITE_ROUNDS {
            let current = self.fetch(id).await?.ok_or(StoreError::NotFound(id))?;

            let mut next = current.clone();
            if mutation(&mut next)? == Change::Unchanged {
                return Ok(current);
            }
            next.version = current.version + 1;
            next.touch(Utc::now());

            if self.compare_and_swap(&next, current.version).await? {
                return Ok(next);
            }
            tracing::debug!(job_id = %id, round, "Job version moved during update, retrying");
        }

        Err(DbError::WriteConflict(id.to_string()).into())
    }
}
