//! Producer-facing enqueue facade.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use tasker_core::{JobStore, NewJob, QueueStats, Result, Schedule};

use crate::buffer::{BufferConfig, JobBuffer};

/// Entry point for producing jobs.
///
/// Enqueued jobs land in the batching buffer and are durable once the
/// flusher's next drain writes them to the store. Reads (stats, counts)
/// go straight to the store and do not see still-buffered jobs.
pub struct Queue {
    buffer: Arc<JobBuffer>,
    store: Arc<dyn JobStore>,
}

impl Queue {
    /// Create a queue over the given store with a fresh buffer.
    pub fn new(store: Arc<dyn JobStore>, config: &BufferConfig) -> Self {
        Self {
            buffer: Arc::new(JobBuffer::new(config)),
            store,
        }
    }

    /// The underlying buffer, for wiring up a `BufferFlusher`.
    pub fn buffer(&self) -> Arc<JobBuffer> {
        self.buffer.clone()
    }

    /// Enqueue a job with a pre-serialized payload.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: impl Into<String>,
        schedule: Schedule,
    ) -> Result<()> {
        let job_type = job_type.into();
        let scheduled_at = schedule.resolve(Utc::now());
        debug!(
            job_type = %job_type,
            scheduled_at = %scheduled_at,
            "Enqueued job"
        );
        self.buffer
            .push(NewJob::new(job_type, payload, scheduled_at))
            .await
    }

    /// Enqueue a job, serializing a typed payload to JSON.
    pub async fn enqueue_json<T: Serialize>(
        &self,
        job_type: impl Into<String>,
        payload: &T,
        schedule: Schedule,
    ) -> Result<()> {
        let payload = serde_json::to_string(payload)?;
        self.enqueue(job_type, payload, schedule).await
    }

    /// Number of `pending` jobs in the store (excludes buffered jobs).
    pub async fn pending_count(&self) -> Result<i64> {
        self.store.pending_count().await
    }

    /// Per-status totals from the store (excludes buffered jobs).
    pub async fn stats(&self) -> Result<QueueStats> {
        self.store.queue_stats().await
    }

    /// Jobs currently buffered and awaiting flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
