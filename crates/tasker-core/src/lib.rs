//! # tasker-core
//!
//! Core types, traits, and abstractions for the tasker job queue.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the persistence layer (`tasker-db`) and the queue
//! subsystem (`tasker-queue`) depend on.

pub mod defaults;
pub mod error;
pub mod models;
pub mod schedule;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::{Job, JobStatus, NewJob, QueueStats, TickReport};
pub use schedule::{Delay, Schedule};
pub use traits::JobStore;
