//! Benchmark engine for eventbench
//!
//! This crate orchestrates the lower layers:
//! - BenchConfig: TOML configuration with defaults
//! - Persistence strategies: transactional read-modify-write, atomic upsert
//! - StatementSet: prepare-once, close-exactly-once statement handles
//! - WorkerPool: stride-rotation workers over the key set
//! - BenchmarkRunner: schema, startup, wait, orderly shutdown and teardown
//! - BackendTarget: target string parsing and backend dispatch
//!
//! The engine is the only component that knows about:
//! - Which statements a strategy needs
//! - Startup and shutdown ordering
//! - Mapping a target string to a concrete backend

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bencher;
pub mod config;
pub mod payload;
pub mod runner;
pub mod statements;
pub mod strategy;
pub mod target;

pub use bencher::{Rotation, WorkerPool, WorkerStats};
pub use config::{BenchConfig, ObservationConfig, StrategyChoice};
pub use payload::encode_fixture;
pub use runner::{BenchmarkRunner, RunSummary};
pub use statements::StatementSet;
pub use strategy::{
    with_transaction, PersistenceStrategy, StrategyKind, TransactionalStrategy, UpsertOutcome,
    UpsertStrategy, WriteOutcome,
};
pub use target::{run_target, BackendTarget};
