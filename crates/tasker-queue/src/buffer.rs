//! In-memory job batching buffer.
//!
//! The buffer coalesces `enqueue` calls issued within one flush window
//! into a single bulk store write, cutting write amplification under
//! load. Pushing returns before durability: a job is durable only once
//! the flusher has drained it into the store.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info};

use tasker_core::{defaults, Error, JobStore, NewJob, Result};

/// What to do when a push finds the buffer at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Fail fast: the push returns an error and the job is not
    /// buffered. The producer decides whether to retry.
    #[default]
    Reject,
    /// Backpressure: the push waits until a flush frees space.
    Block,
}

/// Configuration for the batching buffer and its flusher.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Flush interval in milliseconds.
    pub flush_interval_ms: u64,
    /// Maximum buffered jobs awaiting flush.
    pub capacity: usize,
    /// Behavior when the buffer is full.
    pub overflow: OverflowPolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: defaults::FLUSH_INTERVAL_MS,
            capacity: defaults::BUFFER_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl BufferConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FLUSH_INTERVAL_MS` | `10` | Buffer flush interval |
    /// | `BUFFER_CAPACITY` | `10000` | Max buffered jobs |
    pub fn from_env() -> Self {
        let flush_interval_ms = std::env::var("FLUSH_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::FLUSH_INTERVAL_MS);

        let capacity = std::env::var("BUFFER_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::BUFFER_CAPACITY)
            .max(1);

        Self {
            flush_interval_ms,
            capacity,
            overflow: OverflowPolicy::default(),
        }
    }

    /// Set the flush interval.
    pub fn with_flush_interval(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Set the buffer capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
}

/// Bounded in-memory accumulator of jobs awaiting a bulk insert.
pub struct JobBuffer {
    inner: Mutex<Vec<NewJob>>,
    capacity: usize,
    overflow: OverflowPolicy,
    /// Signalled after a drain frees space, for `Block` pushes.
    space_freed: Notify,
}

impl JobBuffer {
    /// Create a buffer with the given configuration.
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            capacity: config.capacity,
            overflow: config.overflow,
            space_freed: Notify::new(),
        }
    }

    /// Append a job. Returns without waiting for durability.
    pub async fn push(&self, job: NewJob) -> Result<()> {
        loop {
            // Register as a waiter before the capacity check. A drain
            // landing between the check and the await carries no permit
            // (`notify_waiters` wakes only registered waiters), so
            // registering afterwards could miss it and stall the push
            // on an already-empty buffer.
            let notified = self.space_freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut buf = self
                    .inner
                    .lock()
                    .map_err(|_| Error::Internal("job buffer lock poisoned".into()))?;
                if buf.len() < self.capacity {
                    buf.push(job);
                    return Ok(());
                }
            }
            match self.overflow {
                OverflowPolicy::Reject => {
                    return Err(Error::Job(format!(
                        "job buffer full ({} jobs awaiting flush)",
                        self.capacity
                    )));
                }
                OverflowPolicy::Block => notified.await,
            }
        }
    }

    /// Number of buffered jobs awaiting flush.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the whole buffered batch, leaving the buffer empty.
    pub(crate) fn drain(&self) -> Result<Vec<NewJob>> {
        let mut buf = self
            .inner
            .lock()
            .map_err(|_| Error::Internal("job buffer lock poisoned".into()))?;
        let jobs = std::mem::take(&mut *buf);
        drop(buf);
        if !jobs.is_empty() {
            self.space_freed.notify_waiters();
        }
        Ok(jobs)
    }

    /// Put a failed batch back at the front so the next flush retries
    /// it ahead of newer jobs.
    fn requeue_front(&self, mut jobs: Vec<NewJob>) -> Result<()> {
        let mut buf = self
            .inner
            .lock()
            .map_err(|_| Error::Internal("job buffer lock poisoned".into()))?;
        jobs.append(&mut buf);
        *buf = jobs;
        Ok(())
    }
}

/// Handle for controlling a running flusher.
pub struct FlusherHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl FlusherHandle {
    /// Signal the flusher to drain once more and stop.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }
}

/// Periodic task draining the buffer into bulk store writes.
pub struct BufferFlusher {
    buffer: Arc<JobBuffer>,
    store: Arc<dyn JobStore>,
    flush_interval: Duration,
}

impl BufferFlusher {
    /// Create a flusher over the given buffer and store.
    pub fn new(buffer: Arc<JobBuffer>, store: Arc<dyn JobStore>, config: &BufferConfig) -> Self {
        Self {
            buffer,
            store,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
        }
    }

    /// Start the flush loop and return a handle for control.
    pub fn start(self) -> FlusherHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        FlusherHandle { shutdown_tx }
    }

    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "Buffer flusher started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    // Final drain so shutdown does not strand buffered jobs.
                    if let Err(e) = self.flush_once().await {
                        error!(error = %e, "Final flush failed on shutdown");
                    }
                    break;
                }
                _ = sleep(self.flush_interval) => {}
            }

            if let Err(e) = self.flush_once().await {
                error!(error = %e, "Flush failed, batch requeued");
            }
        }

        info!("Buffer flusher stopped");
    }

    /// Drain the buffer and issue one bulk insert.
    ///
    /// An empty buffer produces zero store calls. On store failure the
    /// drained batch goes back to the front of the buffer for the next
    /// flush to retry.
    pub async fn flush_once(&self) -> Result<usize> {
        let jobs = self.buffer.drain()?;
        if jobs.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        match self.store.insert_batch(&jobs).await {
            Ok(ids) => {
                debug!(
                    batch_size = ids.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Flushed buffered jobs"
                );
                Ok(ids.len())
            }
            Err(e) => {
                self.buffer.requeue_front(jobs)?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job(n: usize) -> NewJob {
        NewJob::new("test", format!("{{\"n\":{n}}}"), Utc::now())
    }

    #[test]
    fn test_buffer_config_default() {
        let config = BufferConfig::default();
        assert_eq!(config.flush_interval_ms, defaults::FLUSH_INTERVAL_MS);
        assert_eq!(config.capacity, defaults::BUFFER_CAPACITY);
        assert_eq!(config.overflow, OverflowPolicy::Reject);
    }

    #[test]
    fn test_buffer_config_builder() {
        let config = BufferConfig::default()
            .with_flush_interval(50)
            .with_capacity(16)
            .with_overflow(OverflowPolicy::Block);

        assert_eq!(config.flush_interval_ms, 50);
        assert_eq!(config.capacity, 16);
        assert_eq!(config.overflow, OverflowPolicy::Block);
    }

    #[tokio::test]
    async fn test_push_and_drain() {
        let buffer = JobBuffer::new(&BufferConfig::default());
        assert!(buffer.is_empty());

        buffer.push(job(1)).await.unwrap();
        buffer.push(job(2)).await.unwrap();
        assert_eq!(buffer.len(), 2);

        let drained = buffer.drain().unwrap();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_reject_when_full() {
        let buffer = JobBuffer::new(&BufferConfig::default().with_capacity(2));
        buffer.push(job(1)).await.unwrap();
        buffer.push(job(2)).await.unwrap();

        let result = buffer.push(job(3)).await;
        assert!(matches!(result, Err(Error::Job(_))));
        assert_eq!(buffer.len(), 2);
    }

    #[tokio::test]
    async fn test_block_until_drained() {
        let buffer = Arc::new(JobBuffer::new(
            &BufferConfig::default()
                .with_capacity(1)
                .with_overflow(OverflowPolicy::Block),
        ));
        buffer.push(job(1)).await.unwrap();

        let pusher = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.push(job(2)).await })
        };

        // The blocked push completes once a drain frees space.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pusher.is_finished());
        buffer.drain().unwrap();

        pusher.await.unwrap().unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_block_push_survives_drain_racing_registration() {
        // A drain interleaved anywhere around the blocked push, even
        // right as it parks, must still unblock it.
        for _ in 0..100 {
            let buffer = Arc::new(JobBuffer::new(
                &BufferConfig::default()
                    .with_capacity(1)
                    .with_overflow(OverflowPolicy::Block),
            ));
            buffer.push(job(1)).await.unwrap();

            let pusher = {
                let buffer = buffer.clone();
                tokio::spawn(async move { buffer.push(job(2)).await })
            };
            tokio::task::yield_now().await;
            buffer.drain().unwrap();

            tokio::time::timeout(Duration::from_secs(1), pusher)
                .await
                .expect("push stalled after drain")
                .unwrap()
                .unwrap();
            assert_eq!(buffer.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_requeue_front_preserves_order() {
        let buffer = JobBuffer::new(&BufferConfig::default());
        buffer.push(job(1)).await.unwrap();

        let drained = buffer.drain().unwrap();
        buffer.push(job(2)).await.unwrap();
        buffer.requeue_front(drained).unwrap();

        let all = buffer.drain().unwrap();
        assert_eq!(all[0].payload, "{\"n\":1}");
        assert_eq!(all[1].payload, "{\"n\":2}");
    }
}
