//! The dispatch loop: select due jobs, claim them, fan out to workers,
//! and batch-write terminal statuses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use tasker_core::{defaults, Error, Job, JobStatus, JobStore, Result, TickReport};

use crate::handler::{JobContext, JobHandler, JobOutcome, WorkerRegistry};

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Tick interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Per-job execution timeout in seconds. `0` disables the timeout,
    /// restoring the bare join-all barrier (a hung worker then stalls
    /// the whole tick).
    pub job_timeout_secs: u64,
    /// Whether to enable dispatching.
    pub enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::DISPATCH_INTERVAL_MS,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DISPATCH_ENABLED` | `true` | Enable/disable dispatching |
    /// | `DISPATCH_INTERVAL_MS` | `500` | Tick interval |
    /// | `JOB_TIMEOUT_SECS` | `300` | Per-job timeout (0 = none) |
    pub fn from_env() -> Self {
        let enabled = std::env::var("DISPATCH_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("DISPATCH_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::DISPATCH_INTERVAL_MS);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_TIMEOUT_SECS);

        Self {
            poll_interval_ms,
            job_timeout_secs,
            enabled,
        }
    }

    /// Set the tick interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the per-job timeout (0 disables).
    pub fn with_job_timeout(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    /// Enable or disable dispatching.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the dispatcher.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A job reached `finished`.
    JobFinished { job_id: i64, job_type: String },
    /// A job reached `failed`.
    JobFailed {
        job_id: i64,
        job_type: String,
        error: String,
    },
    /// A tick completed (including idle ticks).
    TickCompleted {
        claimed: usize,
        finished: usize,
        failed: usize,
    },
    /// Dispatcher started.
    DispatcherStarted,
    /// Dispatcher stopped.
    DispatcherStopped,
}

/// Handle for controlling a running dispatcher.
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<DispatchEvent>,
}

impl DispatcherHandle {
    /// Signal the dispatcher to shut down after the current tick.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for dispatcher events.
    pub fn events(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_rx.resubscribe()
    }
}

/// The control loop advancing jobs through their lifecycle.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    registry: Arc<WorkerRegistry>,
    config: DispatcherConfig,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl Dispatcher {
    /// Create a new dispatcher over the given store and registry.
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<WorkerRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            store,
            registry,
            config,
            event_tx,
        }
    }

    /// Get a receiver for dispatcher events.
    pub fn events(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    /// Run one dispatch tick: select due pending jobs, claim them,
    /// fan out to workers with a join-all barrier, then batch-write
    /// terminal statuses.
    ///
    /// Worker failures are isolated per job. Store failures abort the
    /// rest of the tick; if the terminal batch write fails, the tick's
    /// claims are released back to `pending` so a later tick retries
    /// them.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport> {
        let start = Instant::now();
        let now = Utc::now();

        let due = self.store.select_due(now).await?;
        if due.is_empty() {
            let _ = self.event_tx.send(DispatchEvent::TickCompleted {
                claimed: 0,
                finished: 0,
                failed: 0,
            });
            return Ok(TickReport::default());
        }

        // Claim before invoking any worker. The CAS inside the store
        // drops ids another tick already won.
        let ids: Vec<i64> = due.iter().map(|j| j.id).collect();
        let claimed_ids = self.store.claim(&ids).await?;
        let claimed_set: HashSet<i64> = claimed_ids.iter().copied().collect();

        let mut report = TickReport {
            selected: due.len(),
            claimed: claimed_ids.len(),
            ..TickReport::default()
        };
        let mut updates: Vec<(i64, JobStatus)> = Vec::with_capacity(claimed_ids.len());

        let timeout = match self.config.job_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let mut tasks: JoinSet<(i64, String, JobOutcome)> = JoinSet::new();
        let mut spawned: HashMap<i64, String> = HashMap::new();
        for job in due.into_iter().filter(|j| claimed_set.contains(&j.id)) {
            match self.registry.get(&job.job_type) {
                Some(handler) => {
                    spawned.insert(job.id, job.job_type.clone());
                    tasks.spawn(async move {
                        let id = job.id;
                        let job_type = job.job_type.clone();
                        let outcome = execute_one(handler, job, timeout).await;
                        (id, job_type, outcome)
                    });
                }
                None => {
                    // An unmatched job would otherwise sit in
                    // `processing` forever with nothing to resolve it.
                    warn!(
                        job_id = job.id,
                        job_type = %job.job_type,
                        "No worker registered for job type, marking failed"
                    );
                    let error = format!("no worker registered for type '{}'", job.job_type);
                    let _ = self.event_tx.send(DispatchEvent::JobFailed {
                        job_id: job.id,
                        job_type: job.job_type.clone(),
                        error,
                    });
                    updates.push((job.id, JobStatus::Failed));
                    report.failed.push(job.id);
                }
            }
        }

        // Join-all barrier: the tick is done only when every matched
        // worker has resolved.
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok((job_id, job_type, JobOutcome::Success)) => {
                    info!(
                        job_id,
                        job_type = %job_type,
                        "Job finished"
                    );
                    let _ = self
                        .event_tx
                        .send(DispatchEvent::JobFinished { job_id, job_type });
                    updates.push((job_id, JobStatus::Finished));
                    report.finished.push(job_id);
                }
                Ok((job_id, job_type, JobOutcome::Failure(err))) => {
                    warn!(
                        job_id,
                        job_type = %job_type,
                        error = %err,
                        "Job failed"
                    );
                    let _ = self.event_tx.send(DispatchEvent::JobFailed {
                        job_id,
                        job_type,
                        error: err,
                    });
                    updates.push((job_id, JobStatus::Failed));
                    report.failed.push(job_id);
                }
                Err(e) => {
                    // Worker panics are converted to failures inside
                    // execute_one; this is the task itself being
                    // cancelled. The sweep below writes its terminal
                    // status.
                    error!(error = ?e, "Job task join failed");
                }
            }
        }

        // Every claimed job must leave this tick with a terminal write.
        // A job whose task never produced an outcome is marked failed
        // instead of sitting in `processing` forever.
        if updates.len() < report.claimed {
            let resolved: HashSet<i64> = updates.iter().map(|(id, _)| *id).collect();
            for (job_id, job_type) in spawned {
                if resolved.contains(&job_id) {
                    continue;
                }
                warn!(job_id, job_type = %job_type, "Job task produced no outcome, marking failed");
                let _ = self.event_tx.send(DispatchEvent::JobFailed {
                    job_id,
                    job_type,
                    error: "worker task was cancelled".to_string(),
                });
                updates.push((job_id, JobStatus::Failed));
                report.failed.push(job_id);
            }
        }

        if let Err(e) = self.store.update_status_batch(&updates).await {
            // Claims must be reversible: without the release these jobs
            // are no longer pending and would never be re-selected.
            error!(
                error = %e,
                claimed = claimed_ids.len(),
                "Terminal batch write failed, releasing claims"
            );
            if let Err(release_err) = self.store.release(&claimed_ids).await {
                error!(error = %release_err, "Release after failed batch write also failed");
            }
            return Err(e);
        }

        debug!(
            selected = report.selected,
            claimed = report.claimed,
            finished = report.finished.len(),
            failed = report.failed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Tick completed"
        );
        let _ = self.event_tx.send(DispatchEvent::TickCompleted {
            claimed: report.claimed,
            finished: report.finished.len(),
            failed: report.failed.len(),
        });

        Ok(report)
    }

    /// Start the periodic tick loop and return a handle for control.
    ///
    /// The driver is non-reentrant: a tick fully completes, including
    /// its terminal batch write, before the next tick's selection runs.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        DispatcherHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Dispatcher is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            job_timeout_secs = self.config.job_timeout_secs,
            "Dispatcher started"
        );
        let _ = self.event_tx.send(DispatchEvent::DispatcherStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Dispatcher received shutdown signal");
                break;
            }

            // A failing tick never crashes the loop; the next tick
            // retries the read.
            if let Err(e) = self.tick().await {
                error!(error = %e, "Tick failed");
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Dispatcher received shutdown signal");
                    break;
                }
                _ = sleep(poll_interval) => {}
            }
        }

        let _ = self.event_tx.send(DispatchEvent::DispatcherStopped);
        info!("Dispatcher stopped");
    }
}

/// Run a single claimed job to an outcome.
///
/// Panics and timeouts are converted to `Failure` so one worker can
/// never take down the tick or strand its cohort.
async fn execute_one(
    handler: Arc<dyn JobHandler>,
    job: Job,
    timeout: Option<Duration>,
) -> JobOutcome {
    let ctx = JobContext::new(job);
    let fut = std::panic::AssertUnwindSafe(handler.execute(ctx)).catch_unwind();

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                return JobOutcome::Failure(format!(
                    "job exceeded timeout of {}s",
                    limit.as_secs()
                ))
            }
        },
        None => fut.await,
    };

    match result {
        Ok(outcome) => outcome,
        Err(_) => JobOutcome::Failure("worker panicked".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_default() {
        let config = DispatcherConfig::default();
        assert_eq!(config.poll_interval_ms, defaults::DISPATCH_INTERVAL_MS);
        assert_eq!(config.job_timeout_secs, defaults::JOB_TIMEOUT_SECS);
        assert!(config.enabled);
    }

    #[test]
    fn test_dispatcher_config_builder() {
        let config = DispatcherConfig::default()
            .with_poll_interval(1000)
            .with_job_timeout(10)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.job_timeout_secs, 10);
        assert!(!config.enabled);
    }

    #[test]
    fn test_dispatch_event_clone_and_debug() {
        let event = DispatchEvent::JobFailed {
            job_id: 7,
            job_type: "log".to_string(),
            error: "boom".to_string(),
        };
        let cloned = event.clone();
        let debug_str = format!("{:?}", cloned);
        assert!(debug_str.contains("JobFailed"));
        assert!(debug_str.contains("boom"));
    }
}
