//! Concurrency primitives for eventbench
//!
//! This crate holds the shared-state pieces of the harness:
//! - ThroughputCounter: atomic success counter with swap-to-zero sampling
//! - ThroughputReporter: per-interval `"<n> events/sec"` reporting thread
//! - LockTable: exclusive row locks with cancellation and wait timeout
//! - Pool: bounded connection pool with cancellable checkout

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counter;
pub mod lock_table;
pub mod pool;
pub mod reporter;

pub use counter::ThroughputCounter;
pub use lock_table::{LockGuard, LockTable};
pub use pool::{Pool, PoolGuard};
pub use reporter::{ReportSink, ThroughputReporter};
