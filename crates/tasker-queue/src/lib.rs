//! # tasker-queue
//!
//! Batching producer side and polling dispatch side of the tasker job
//! queue.
//!
//! This crate provides:
//! - A `Queue` facade that buffers enqueues and flushes them as bulk
//!   inserts
//! - A `WorkerRegistry` mapping job types to typed async handlers
//! - A polling `Dispatcher` that claims due jobs, fans out to workers,
//!   and batch-writes terminal statuses
//! - Lifecycle events via broadcast channels and graceful shutdown
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tasker_queue::{
//!     BufferConfig, BufferFlusher, Dispatcher, DispatcherConfig, Queue, Schedule,
//!     TypedHandler, WorkerRegistry,
//! };
//! use tasker_db::Database;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Greet { name: String }
//!
//! let db = Database::connect("postgres://...").await?;
//! let store = Arc::new(db.jobs);
//!
//! // Register workers before starting the dispatcher.
//! let mut registry = WorkerRegistry::new();
//! registry.register(TypedHandler::new("greet", |p: Greet| async move {
//!     println!("hello {}", p.name);
//!     Ok(())
//! }));
//!
//! // Producer side: buffered enqueues, one bulk insert per flush.
//! let queue = Queue::new(store.clone(), &BufferConfig::from_env());
//! let flusher =
//!     BufferFlusher::new(queue.buffer(), store.clone(), &BufferConfig::from_env()).start();
//!
//! queue.enqueue_json("greet", &serde_json::json!({"name": "x"}), Schedule::Now).await?;
//!
//! // Dispatch side: periodic ticks claim and run due jobs.
//! let dispatcher =
//!     Dispatcher::new(store, Arc::new(registry), DispatcherConfig::from_env());
//! let handle = dispatcher.start();
//!
//! // Graceful shutdown drains the buffer and finishes the current tick.
//! flusher.shutdown().await?;
//! handle.shutdown().await?;
//! ```

pub mod buffer;
pub mod dispatcher;
pub mod handler;
pub mod queue;

// Re-export core types
pub use tasker_core::*;

pub use buffer::{BufferConfig, BufferFlusher, FlusherHandle, JobBuffer, OverflowPolicy};
pub use dispatcher::{DispatchEvent, Dispatcher, DispatcherConfig, DispatcherHandle};
pub use handler::{JobContext, JobHandler, JobOutcome, NoOpHandler, TypedHandler, WorkerRegistry};
pub use queue::Queue;

/// Default dispatch tick interval (milliseconds).
pub const DEFAULT_DISPATCH_INTERVAL_MS: u64 = tasker_core::defaults::DISPATCH_INTERVAL_MS;

/// Default buffer flush interval (milliseconds).
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = tasker_core::defaults::FLUSH_INTERVAL_MS;
