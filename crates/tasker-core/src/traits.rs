//! Trait definitions for the durable job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Job, JobStatus, NewJob, QueueStats};

/// Durable persistence of jobs and atomic status queries/updates.
///
/// The store is the single shared mutable resource of the queue. All
/// mutation goes through the dispatcher (claims and terminal writes)
/// and the insert path (the batching buffer's flush). Implementations
/// must make `claim` a compare-and-set on `status = pending` so two
/// back-to-back ticks cannot both win the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a single job in `pending` status. Returns the assigned id.
    ///
    /// Once this returns `Ok`, the job must survive a crash.
    async fn insert(&self, job: NewJob) -> Result<i64>;

    /// Insert many jobs as one bulk write. Returns assigned ids in
    /// input order. Used by the batching buffer's flush.
    async fn insert_batch(&self, jobs: &[NewJob]) -> Result<Vec<i64>>;

    /// All jobs with `status = pending` and `scheduled_at <= now`.
    ///
    /// No lock is implied; callers must `claim` before acting.
    async fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<Job>>;

    /// Transition the given jobs `pending -> processing` in one bulk
    /// update. Returns the ids actually claimed; ids already claimed
    /// elsewhere (or terminal) are absent from the result.
    async fn claim(&self, ids: &[i64]) -> Result<Vec<i64>>;

    /// Apply a batch of terminal status writes as one bulk operation.
    ///
    /// Only `processing` rows transition, so re-applying a terminal
    /// batch is a no-op and a terminal status never regresses.
    async fn update_status_batch(&self, updates: &[(i64, JobStatus)]) -> Result<()>;

    /// Roll claimed jobs back `processing -> pending` so a later tick
    /// can retry them. Used when a tick fails after its claim step.
    async fn release(&self, ids: &[i64]) -> Result<()>;

    /// Fetch a job by id.
    async fn get(&self, id: i64) -> Result<Option<Job>>;

    /// Number of `pending` jobs.
    async fn pending_count(&self) -> Result<i64>;

    /// Per-status queue totals.
    async fn queue_stats(&self) -> Result<QueueStats>;
}
