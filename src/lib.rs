//! eventbench - contention throughput benchmark for idempotent event-record writes
//!
//! A fixed pool of workers repeatedly writes the same payload to a fixed set
//! of contention keys through one of two persistence strategies, while a
//! reporter prints successful writes per second:
//!
//! - transactional read-modify-write (lookup, then insert or update)
//! - atomic upsert maintaining per-key counters and a 20-slot history ring
//!
//! # Quick Start
//!
//! ```ignore
//! use eventbench::{run_target, BenchConfig, CancellationToken};
//!
//! let config = BenchConfig { duration_secs: Some(10), ..BenchConfig::default() };
//! let summary = run_target(&config, &CancellationToken::new(), Box::new(std::io::stdout()))?;
//! println!("{} writes", summary.successes);
//! ```
//!
//! # Architecture
//!
//! - `eventbench-core`: types, merge rules, errors, backend traits
//! - `eventbench-concurrency`: counter, reporter, pool, row locks
//! - `eventbench-storage`: memory, SQLite, PostgreSQL and MySQL backends
//! - `eventbench-engine`: strategies, workers, runner

pub use eventbench_concurrency::{ReportSink, ThroughputCounter, ThroughputReporter};
pub use eventbench_core::{
    generate_key_set, Backend, CancellationToken, CheckState, CompositeKey, Error, EventKey,
    EventRecord, Observation, Payload, Result, SqlValue, StatementKind, Transaction,
    HISTORY_LEN,
};
pub use eventbench_engine::{
    encode_fixture, run_target, with_transaction, BackendTarget, BenchConfig, BenchmarkRunner,
    ObservationConfig, PersistenceStrategy, RunSummary, StatementSet, StrategyChoice,
    StrategyKind, TransactionalStrategy, UpsertOutcome, UpsertStrategy, WorkerPool, WorkerStats,
    WriteOutcome,
};
pub use eventbench_storage::{MemoryBackend, MemoryConfig};
#[cfg(feature = "mysql")]
pub use eventbench_storage::{MysqlBackend, MysqlConfig};
#[cfg(feature = "postgres")]
pub use eventbench_storage::{PostgresBackend, PostgresConfig};
#[cfg(feature = "sqlite")]
pub use eventbench_storage::{SqliteBackend, SqliteConfig};
