//! Job handlers and the worker registry.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use tasker_core::{Job, Result};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// The raw opaque payload string.
    pub fn payload(&self) -> &str {
        &self.job.payload
    }

    /// Deserialize the payload as JSON into `T`.
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.job.payload)?)
    }
}

/// Result of a worker invocation.
///
/// Explicit success/failure-with-reason, captured into the status
/// pipeline; worker failures never propagate as panics or errors to
/// the tick driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job completed; the dispatcher writes `finished`.
    Success,
    /// Job failed with a descriptive reason; the dispatcher writes
    /// `failed`. Terminal, never retried automatically.
    Failure(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type string this handler processes.
    fn job_type(&self) -> &str;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobOutcome;
}

/// Handler adapter that deserializes the opaque payload into a typed
/// value before invoking an async function.
///
/// This is the typed seam between the store (which treats payloads as
/// opaque strings) and workers (which want real types): a payload that
/// fails to deserialize yields a `Failure` outcome, not a panic.
pub struct TypedHandler<T, F, Fut>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), String>> + Send,
{
    job_type: String,
    func: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F, Fut> TypedHandler<T, F, Fut>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), String>> + Send,
{
    /// Create a typed handler for the given job type.
    pub fn new(job_type: impl Into<String>, func: F) -> Self {
        Self {
            job_type: job_type.into(),
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> JobHandler for TypedHandler<T, F, Fut>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), String>> + Send,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    async fn execute(&self, ctx: JobContext) -> JobOutcome {
        let payload: T = match ctx.payload_json() {
            Ok(p) => p,
            Err(e) => return JobOutcome::Failure(format!("payload deserialization failed: {e}")),
        };
        match (self.func)(payload).await {
            Ok(()) => JobOutcome::Success,
            Err(reason) => JobOutcome::Failure(reason),
        }
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: String,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given job type.
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
        }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> &str {
        &self.job_type
    }

    async fn execute(&self, _ctx: JobContext) -> JobOutcome {
        JobOutcome::Success
    }
}

/// Mapping from job type to handler.
///
/// An explicit object constructed at startup and shared with the
/// dispatcher by `Arc`; registration is not synchronized with active
/// dispatch, so register everything before starting the dispatcher.
#[derive(Default)]
pub struct WorkerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its job type. Last registration wins.
    pub fn register<H: JobHandler + 'static>(&mut self, handler: H) {
        self.register_arc(Arc::new(handler));
    }

    /// Register an already-shared handler. Last registration wins.
    pub fn register_arc(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type().to_string();
        debug!(job_type = %job_type, "Registered job handler");
        self.handlers.insert(job_type, handler);
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
