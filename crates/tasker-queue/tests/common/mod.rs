//! In-memory `JobStore` used by the queue behavior tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tasker_core::{Error, Job, JobStatus, JobStore, NewJob, QueueStats, Result};

/// Install a test-writer subscriber so `RUST_LOG` surfaces queue logs.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct State {
    next_id: i64,
    jobs: BTreeMap<i64, Job>,
}

/// A store mirroring the SQL contract, with failure-injection knobs.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<State>,
    /// Sizes of each `insert_batch` call, in order.
    pub batch_sizes: Mutex<Vec<usize>>,
    /// When set, the next `insert_batch` fails once.
    pub fail_next_insert_batch: AtomicBool,
    /// When set, the next `update_status_batch` fails once.
    pub fail_next_status_batch: AtomicBool,
    /// When set, the next `select_due` ignores status, simulating a
    /// stale read racing a concurrent claim.
    pub stale_next_select: AtomicBool,
    pub release_calls: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert directly, bypassing pending-status bookkeeping.
    pub fn seed(&self, job_type: &str, payload: &str, scheduled_at: DateTime<Utc>) -> i64 {
        let mut state = self.inner.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.jobs.insert(
            id,
            Job {
                id,
                job_type: job_type.to_string(),
                payload: payload.to_string(),
                status: JobStatus::Pending,
                scheduled_at,
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn status_of(&self, id: i64) -> Option<JobStatus> {
        self.inner.lock().unwrap().jobs.get(&id).map(|j| j.status)
    }

    pub fn insert_batch_calls(&self) -> usize {
        self.batch_sizes.lock().unwrap().len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: NewJob) -> Result<i64> {
        Ok(self.seed(&job.job_type, &job.payload, job.scheduled_at))
    }

    async fn insert_batch(&self, jobs: &[NewJob]) -> Result<Vec<i64>> {
        if self.fail_next_insert_batch.swap(false, Ordering::SeqCst) {
            return Err(Error::Internal("injected insert failure".into()));
        }
        self.batch_sizes.lock().unwrap().push(jobs.len());
        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            ids.push(self.seed(&job.job_type, &job.payload, job.scheduled_at));
        }
        Ok(ids)
    }

    async fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let stale = self.stale_next_select.swap(false, Ordering::SeqCst);
        let state = self.inner.lock().unwrap();
        Ok(state
            .jobs
            .values()
            .filter(|j| (stale || j.status == JobStatus::Pending) && j.scheduled_at <= now)
            .cloned()
            .collect())
    }

    async fn claim(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let mut state = self.inner.lock().unwrap();
        let mut claimed = Vec::new();
        for id in ids {
            if let Some(job) = state.jobs.get_mut(id) {
                if job.status == JobStatus::Pending {
                    job.status = JobStatus::Processing;
                    claimed.push(*id);
                }
            }
        }
        Ok(claimed)
    }

    async fn update_status_batch(&self, updates: &[(i64, JobStatus)]) -> Result<()> {
        if self.fail_next_status_batch.swap(false, Ordering::SeqCst) {
            return Err(Error::Internal("injected status write failure".into()));
        }
        let mut state = self.inner.lock().unwrap();
        for (id, status) in updates {
            if !status.is_terminal() {
                return Err(Error::Job(format!(
                    "non-terminal status in batch update: {status:?}"
                )));
            }
            if let Some(job) = state.jobs.get_mut(id) {
                if job.status == JobStatus::Processing {
                    job.status = *status;
                }
            }
        }
        Ok(())
    }

    async fn release(&self, ids: &[i64]) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.inner.lock().unwrap();
        for id in ids {
            if let Some(job) = state.jobs.get_mut(id) {
                if job.status == JobStatus::Processing {
                    job.status = JobStatus::Pending;
                }
            }
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Job>> {
        Ok(self.inner.lock().unwrap().jobs.get(&id).cloned())
    }

    async fn pending_count(&self) -> Result<i64> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let state = self.inner.lock().unwrap();
        let count =
            |s: JobStatus| state.jobs.values().filter(|j| j.status == s).count() as i64;
        Ok(QueueStats {
            pending: count(JobStatus::Pending),
            processing: count(JobStatus::Processing),
            finished: count(JobStatus::Finished),
            failed: count(JobStatus::Failed),
            total: state.jobs.len() as i64,
        })
    }
}
