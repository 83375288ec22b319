//! Job domain types and the lifecycle state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::retry::RetryPolicy;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of task a worker is asked to perform.
///
/// The set is open: any unrecognised name maps to [`JobType::Unknown`]
/// instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    HttpGet,
    ImageResize,
    Sleep,
    Unknown,
}

impl JobType {
    /// Parse a task kind, ignoring case and surrounding whitespace.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "HTTP_GET" => JobType::HttpGet,
            "IMAGE_RESIZE" => JobType::ImageResize,
            "SLEEP" => JobType::Sleep,
            _ => JobType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::HttpGet => "HTTP_GET",
            JobType::ImageResize => "IMAGE_RESIZE",
            JobType::Sleep => "SLEEP",
            JobType::Unknown => "UNKNOWN",
        }
    }
}

impl From<String> for JobType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data-less discriminant of [`JobStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Dispatched,
    InProgress,
    Completed,
    Failed,
}

impl JobState {
    /// Check if no transition can leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::Dispatched => "DISPATCHED",
            JobState::InProgress => "IN_PROGRESS",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of a job in its lifecycle.
///
/// Terminal data lives inside the variant, so a result exists only for
/// completed jobs and an error detail only for failed ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Durably accepted, not yet confirmed on the bus.
    #[default]
    Created,
    /// Handed to the message bus.
    Dispatched { dispatched_at: DateTime<Utc> },
    /// A worker reported it has started.
    InProgress {
        started_at: DateTime<Utc>,
        worker_id: String,
    },
    /// The worker reported success.
    Completed {
        completed_at: DateTime<Utc>,
        result: serde_json::Value,
    },
    /// The worker reported failure, or dispatch was exhausted.
    Failed {
        failed_at: DateTime<Utc>,
        error_detail: String,
    },
}

impl JobStatus {
    pub fn state(&self) -> JobState {
        match self {
            JobStatus::Created => JobState::Created,
            JobStatus::Dispatched { .. } => JobState::Dispatched,
            JobStatus::InProgress { .. } => JobState::InProgress,
            JobStatus::Completed { .. } => JobState::Completed,
            JobStatus::Failed { .. } => JobState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }
}

/// Terminal outcome reported by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Completed { result: serde_json::Value },
    Failed { error_detail: String },
}

impl Outcome {
    pub fn completed(result: serde_json::Value) -> Self {
        Outcome::Completed { result }
    }

    pub fn failed(error_detail: impl Into<String>) -> Self {
        Outcome::Failed {
            error_detail: error_detail.into(),
        }
    }

    /// The terminal state this outcome leads to.
    pub fn state(&self) -> JobState {
        match self {
            Outcome::Completed { .. } => JobState::Completed,
            Outcome::Failed { .. } => JobState::Failed,
        }
    }
}

/// Whether a mutation changed the job and must be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Applied,
    Unchanged,
}

/// A transition that is illegal for the job's current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("job {job_id} is already {current}, cannot record {reported}")]
    AlreadyTerminal {
        job_id: JobId,
        current: JobState,
        reported: JobState,
    },
    #[error("job {job_id} is already {current} with different data")]
    OutcomeMismatch { job_id: JobId, current: JobState },
}

/// A job represents a unit of requested work tracked from creation to a
/// terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, assigned by the store.
    pub id: JobId,
    /// Kind of task.
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Job payload as JSON.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Number of dispatch attempts so far.
    #[serde(default)]
    pub dispatch_attempts: u32,
    /// When the retry lane should next try to dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_dispatch_at: Option<DateTime<Utc>>,
    /// Error from the most recent failed dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_dispatch_error: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// Incremented on every persisted mutation.
    #[serde(default)]
    pub version: u64,
}

impl Job {
    /// Create a new job in the `CREATED` state.
    pub fn new(id: JobId, job_type: JobType, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_type,
            payload,
            status: JobStatus::Created,
            dispatch_attempts: 0,
            next_dispatch_at: None,
            last_dispatch_error: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn state(&self) -> JobState {
        self.status.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Result of a completed job.
    pub fn result(&self) -> Option<&serde_json::Value> {
        match &self.status {
            JobStatus::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Error detail of a failed job.
    pub fn error_detail(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Failed { error_detail, .. } => Some(error_detail),
            _ => None,
        }
    }

    /// Stamp `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Record a successful hand-off to the bus.
    ///
    /// Only a `CREATED` job moves; a duplicate confirmation or one racing a
    /// completion report leaves the job as it is.
    pub fn mark_dispatched(&mut self, at: DateTime<Utc>) -> Change {
        if self.state() != JobState::Created {
            return Change::Unchanged;
        }
        self.dispatch_attempts = self.dispatch_attempts.saturating_add(1);
        self.status = JobStatus::Dispatched { dispatched_at: at };
        self.next_dispatch_at = None;
        self.last_dispatch_error = None;
        Change::Applied
    }

    /// Record a failed dispatch attempt and schedule the next one, or fail
    /// the job once the policy's attempt cap is reached.
    pub fn record_dispatch_failure(
        &mut self,
        at: DateTime<Utc>,
        error: &str,
        policy: &RetryPolicy,
    ) -> Change {
        if self.state() != JobState::Created {
            return Change::Unchanged;
        }
        self.dispatch_attempts = self.dispatch_attempts.saturating_add(1);
        self.last_dispatch_error = Some(error.to_string());

        if policy.can_retry(self.dispatch_attempts) {
            self.next_dispatch_at = Some(at + policy.delay_for(self.dispatch_attempts));
        } else {
            self.next_dispatch_at = None;
            self.status = JobStatus::Failed {
                failed_at: at,
                error_detail: format!(
                    "dispatch exhausted after {} attempts: {}",
                    self.dispatch_attempts, error
                ),
            };
        }
        Change::Applied
    }

    /// Record a worker heartbeat.
    ///
    /// Late heartbeats for terminal jobs are ignored.
    pub fn mark_in_progress(&mut self, worker_id: &str, at: DateTime<Utc>) -> Change {
        match self.state() {
            JobState::Created | JobState::Dispatched => {
                self.status = JobStatus::InProgress {
                    started_at: at,
                    worker_id: worker_id.to_string(),
                };
                self.next_dispatch_at = None;
                Change::Applied
            }
            _ => Change::Unchanged,
        }
    }

    /// Apply a worker's terminal report.
    ///
    /// Reporting the stored outcome again is a no-op; reporting anything else
    /// for a terminal job is rejected.
    pub fn apply_outcome(
        &mut self,
        outcome: &Outcome,
        at: DateTime<Utc>,
    ) -> Result<Change, TransitionError> {
        match (&self.status, outcome) {
            (JobStatus::Completed { result, .. }, Outcome::Completed { result: reported }) => {
                if result == reported {
                    Ok(Change::Unchanged)
                } else {
                    Err(TransitionError::OutcomeMismatch {
                        job_id: self.id,
                        current: JobState::Completed,
                    })
                }
            }
            (
                JobStatus::Failed { error_detail, .. },
                Outcome::Failed {
                    error_detail: reported,
                },
            ) => {
                if error_detail == reported {
                    Ok(Change::Unchanged)
                } else {
                    Err(TransitionError::OutcomeMismatch {
                        job_id: self.id,
                        current: JobState::Failed,
                    })
                }
            }
            (status, _) if status.is_terminal() => Err(TransitionError::AlreadyTerminal {
                job_id: self.id,
                current: status.state(),
                reported: outcome.state(),
            }),
            _ => {
                self.status = match outcome {
                    Outcome::Completed { result } => JobStatus::Completed {
                        completed_at: at,
                        result: result.clone(),
                    },
                    Outcome::Failed { error_detail } => JobStatus::Failed {
                        failed_at: at,
                        error_detail: error_detail.clone(),
                    },
                };
                self.next_dispatch_at = None;
                Ok(Change::Applied)
            }
        }
    }

    /// Check if the retry lane should attempt dispatch now.
    ///
    /// A job is due when its scheduled retry time has passed, or when it never
    /// recorded an attempt and has been sitting in `CREATED` longer than
    /// `stuck_after`.
    pub fn is_dispatch_due(&self, now: DateTime<Utc>, stuck_after: Duration) -> bool {
        if self.state() != JobState::Created {
            return false;
        }
        match self.next_dispatch_at {
            Some(at) => at <= now,
            None => self.dispatch_attempts == 0 && self.created_at + stuck_after <= now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sleep_job() -> Job {
        Job::new(JobId::new(), JobType::Sleep, json!({ "duration_ms": 3000 }))
    }

    #[test]
    fn job_type_parsing_is_lenient() {
        assert_eq!(JobType::parse("sleep"), JobType::Sleep);
        assert_eq!(JobType::parse(" http_get "), JobType::HttpGet);
        assert_eq!(JobType::parse("IMAGE_RESIZE"), JobType::ImageResize);
        assert_eq!(JobType::parse("TRANSCODE"), JobType::Unknown);

        let parsed: JobType = serde_json::from_value(json!("transcode")).unwrap();
        assert_eq!(parsed, JobType::Unknown);
        assert_eq!(serde_json::to_value(JobType::Sleep).unwrap(), json!("SLEEP"));
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let mut job = sleep_job();
        job.apply_outcome(&Outcome::completed(json!({})), Utc::now())
            .unwrap();

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], json!("SLEEP"));
        assert_eq!(value["status"]["state"], json!("COMPLETED"));
        assert_eq!(value["status"]["result"], json!({}));

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn dispatch_moves_created_only() {
        let mut job = sleep_job();
        assert_eq!(job.mark_dispatched(Utc::now()), Change::Applied);
        assert_eq!(job.state(), JobState::Dispatched);
        assert_eq!(job.dispatch_attempts, 1);

        assert_eq!(job.mark_dispatched(Utc::now()), Change::Unchanged);
        assert_eq!(job.dispatch_attempts, 1);
    }

    #[test]
    fn completion_accepted_before_dispatch_confirmed() {
        let mut job = sleep_job();
        let change = job
            .apply_outcome(&Outcome::completed(json!({ "ok": true })), Utc::now())
            .unwrap();
        assert_eq!(change, Change::Applied);
        assert_eq!(job.result(), Some(&json!({ "ok": true })));
        assert_eq!(job.error_detail(), None);
    }

    #[test]
    fn repeated_outcome_is_idempotent() {
        let mut job = sleep_job();
        job.mark_dispatched(Utc::now());
        job.apply_outcome(&Outcome::failed("boom"), Utc::now())
            .unwrap();
        let before = job.clone();

        let change = job
            .apply_outcome(&Outcome::failed("boom"), Utc::now())
            .unwrap();
        assert_eq!(change, Change::Unchanged);
        assert_eq!(job, before);
    }

    #[test]
    fn contradicting_outcome_is_rejected() {
        let mut job = sleep_job();
        job.apply_outcome(&Outcome::completed(json!("r1")), Utc::now())
            .unwrap();

        let err = job
            .apply_outcome(&Outcome::failed("e"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));

        let err = job
            .apply_outcome(&Outcome::completed(json!("r2")), Utc::now())
            .unwrap_err();
        assert!(matches!(err, TransitionError::OutcomeMismatch { .. }));
        assert_eq!(job.result(), Some(&json!("r1")));
    }

    #[test]
    fn dispatch_failures_exhaust_into_failed() {
        let policy = RetryPolicy::new(Duration::seconds(1), Duration::seconds(10), 3);
        let mut job = sleep_job();
        let now = Utc::now();

        job.record_dispatch_failure(now, "broker down", &policy);
        assert_eq!(job.state(), JobState::Created);
        assert_eq!(job.next_dispatch_at, Some(now + Duration::seconds(1)));

        job.record_dispatch_failure(now, "broker down", &policy);
        assert_eq!(job.next_dispatch_at, Some(now + Duration::seconds(2)));

        job.record_dispatch_failure(now, "broker down", &policy);
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.dispatch_attempts, 3);
        assert!(job.error_detail().unwrap().contains("dispatch exhausted"));
        assert_eq!(job.next_dispatch_at, None);

        assert_eq!(
            job.record_dispatch_failure(now, "again", &policy),
            Change::Unchanged
        );
    }

    #[test]
    fn dispatch_due_rules() {
        let stuck_after = Duration::seconds(30);
        let mut job = sleep_job();
        let created = job.created_at;

        assert!(!job.is_dispatch_due(created, stuck_after));
        assert!(job.is_dispatch_due(created + Duration::seconds(31), stuck_after));

        job.dispatch_attempts = 1;
        job.next_dispatch_at = Some(created + Duration::seconds(5));
        assert!(!job.is_dispatch_due(created + Duration::seconds(4), stuck_after));
        assert!(job.is_dispatch_due(created + Duration::seconds(5), stuck_after));

        job.mark_dispatched(created);
        assert!(!job.is_dispatch_due(created + Duration::days(1), stuck_after));
    }

    #[test]
    fn heartbeat_ignored_after_terminal() {
        let mut job = sleep_job();
        assert_eq!(job.mark_in_progress("w-1", Utc::now()), Change::Applied);
        assert_eq!(job.state(), JobState::InProgress);

        job.apply_outcome(&Outcome::completed(json!(null)), Utc::now())
            .unwrap();
        assert_eq!(job.mark_in_progress("w-1", Utc::now()), Change::Unchanged);
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut job = sleep_job();
        let later = job.updated_at + Duration::seconds(5);
        job.touch(later);
        job.touch(later - Duration::seconds(10));
        assert_eq!(job.updated_at, later);
    }
}
