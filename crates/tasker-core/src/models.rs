//! Data model for the persisted job queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a job in the queue.
///
/// Transitions are strictly `pending -> processing -> {finished, failed}`.
/// The terminal statuses are never left automatically; a terminal job is
/// never re-dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to become due and be claimed by a dispatch tick.
    Pending,
    /// Claimed by a tick; a worker is (or should be) running it.
    Processing,
    /// Worker completed without error. Terminal.
    Finished,
    /// Worker returned a failure or none was registered. Terminal.
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    /// Whether `next` is a valid direct transition from this status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Finished)
                | (JobStatus::Processing, JobStatus::Failed)
                // Claim rollback after a failed batch write.
                | (JobStatus::Processing, JobStatus::Pending)
        )
    }
}

/// A job in the processing queue.
///
/// `payload` is an opaque serialized string; only the handler registered
/// for `job_type` interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique id, assigned by the store on insertion.
    pub id: i64,
    /// Worker lookup key.
    pub job_type: String,
    /// Opaque serialized payload.
    pub payload: String,
    pub status: JobStatus,
    /// Eligibility gate: dispatchable only once `now >= scheduled_at`.
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A job about to be inserted into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: String,
    pub payload: String,
    pub scheduled_at: DateTime<Utc>,
}

impl NewJob {
    /// Create a new pending job description.
    pub fn new(
        job_type: impl Into<String>,
        payload: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_type: job_type.into(),
            payload: payload.into(),
            scheduled_at,
        }
    }
}

/// Queue statistics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub finished: i64,
    pub failed: i64,
    pub total: i64,
}

/// Outcome of a single dispatch tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    /// Jobs returned by the due-query.
    pub selected: usize,
    /// Jobs actually claimed (CAS winners).
    pub claimed: usize,
    /// Ids that reached `finished` this tick.
    pub finished: Vec<i64>,
    /// Ids that reached `failed` this tick.
    pub failed: Vec<i64>,
}

impl TickReport {
    /// Whether the tick found nothing to do.
    pub fn is_idle(&self) -> bool {
        self.selected == 0
    }
}
