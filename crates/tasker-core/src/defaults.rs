//! Centralized default constants for the tasker queue.
//!
//! **This module is the single source of truth** for shared default
//! values. Other crates reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// DISPATCH
// =============================================================================

/// Default dispatch tick interval in milliseconds.
///
/// A deployment parameter, not a queue invariant: the dispatcher is
/// correct at any cadence, this only bounds dispatch latency.
pub const DISPATCH_INTERVAL_MS: u64 = 500;

/// Default per-job execution timeout in seconds (5 minutes).
///
/// A hung worker would otherwise stall the tick's join-all barrier and
/// delay the terminal batch write for the whole cohort.
pub const JOB_TIMEOUT_SECS: u64 = 300;

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// BATCHING BUFFER
// =============================================================================

/// Default buffer flush interval in milliseconds.
///
/// The buffer coalesces inserts issued within one window into a single
/// bulk write; this is a batching window, not a durability delay knob.
pub const FLUSH_INTERVAL_MS: u64 = 10;

/// Default maximum number of buffered jobs awaiting flush.
pub const BUFFER_CAPACITY: usize = 10_000;
