//! Benchmark driver
//!
//! # Run Sequence
//!
//! 1. Resolve the strategy against the backend's capabilities
//! 2. `ensure_schema()` (fatal on failure)
//! 3. Arm the teardown guard: from here on, every exit path clears the table
//! 4. Encode the payload, generate the key set
//! 5. Prepare statements (fatal on failure, unless the token is already set)
//! 6. Start the reporter, run the workers until the token fires
//! 7. Join workers, close statements, stop the reporter
//! 8. Count rows, clear the table, return the summary

use crate::bencher::{WorkerPool, WorkerStats};
use crate::config::BenchConfig;
use crate::payload::encode_fixture;
use crate::statements::StatementSet;
use crate::strategy::{PersistenceStrategy, StrategyKind, TransactionalStrategy, UpsertStrategy};
use eventbench_concurrency::{ReportSink, ThroughputCounter, ThroughputReporter};
use eventbench_core::{generate_key_set, Backend, CancellationToken, EventKey, Payload, Result};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Strategy that ran
    pub strategy: StrategyKind,
    /// Number of workers started
    pub workers: usize,
    /// Successful writes
    pub successes: u64,
    /// Failed writes, benign ones included
    pub failures: u64,
    /// Rows in the table after the workers stopped, if it could be counted
    pub rows_before_teardown: Option<u64>,
    /// Rows removed by teardown, `None` if teardown failed
    pub rows_cleared: Option<u64>,
    /// Wall time from start to teardown
    pub elapsed: Duration,
    /// The token fired before any worker started
    pub cancelled_during_startup: bool,
}

/// Clears the table when dropped unless finished explicitly
struct Teardown<'b, B: Backend> {
    backend: &'b B,
    done: bool,
}

impl<'b, B: Backend> Teardown<'b, B> {
    fn new(backend: &'b B) -> Self {
        Self {
            backend,
            done: false,
        }
    }

    fn finish(mut self) -> Option<u64> {
        self.clear()
    }

    fn clear(&mut self) -> Option<u64> {
        if self.done {
            return None;
        }
        self.done = true;
        match self.backend.clear_all_rows() {
            Ok(n) => {
                info!(target: "eventbench::run", rows = n, "cleared events table");
                Some(n)
            }
            Err(e) => {
                warn!(target: "eventbench::run", error = %e, "teardown failed");
                None
            }
        }
    }
}

impl<B: Backend> Drop for Teardown<'_, B> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Drives one benchmark run against a backend
pub struct BenchmarkRunner {
    config: BenchConfig,
    cancel: CancellationToken,
}

impl BenchmarkRunner {
    /// Create a runner; `cancel` stops the run
    pub fn new(config: BenchConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Configuration in use
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run until the token fires (or the configured duration elapses)
    ///
    /// # Errors
    ///
    /// Fatal startup errors only: invalid configuration, schema creation,
    /// payload encoding, statement preparation while the token is clear,
    /// thread spawn. Per-write failures are counted in the summary.
    pub fn run<B: Backend>(&self, backend: &B, sink: ReportSink) -> Result<RunSummary> {
        let started = Instant::now();
        self.config.validate()?;
        let strategy = StrategyKind::resolve(self.config.strategy, backend.capabilities())?;
        info!(
            target: "eventbench::run",
            backend = backend.name(),
            %strategy,
            concurrency = self.config.concurrency,
            connections = self.config.connections,
            events = self.config.event_count,
            "starting benchmark"
        );

        backend.ensure_schema()?;
        let teardown = Teardown::new(backend);

        let payload = encode_fixture()?;
        let keys = generate_key_set(self.config.event_count);

        let statements = match StatementSet::prepare(backend, strategy.statements(), &self.cancel)
        {
            Ok(set) => set,
            Err(e) if self.cancel.is_cancelled() => {
                info!(target: "eventbench::run", error = %e, "cancelled during startup");
                let rows_cleared = teardown.finish();
                return Ok(RunSummary {
                    strategy,
                    workers: 0,
                    successes: 0,
                    failures: 0,
                    rows_before_teardown: None,
                    rows_cleared,
                    elapsed: started.elapsed(),
                    cancelled_during_startup: true,
                });
            }
            Err(e) => return Err(e),
        };

        let counter = Arc::new(ThroughputCounter::new());
        let reporter =
            ThroughputReporter::spawn(Arc::clone(&counter), self.config.report_interval(), sink)?;

        let stats = match strategy {
            StrategyKind::Transactional => {
                let s = TransactionalStrategy::new(backend, &statements)?;
                self.drive(&s, &keys, &payload, &counter)
            }
            StrategyKind::Upsert => {
                let s = UpsertStrategy::new(
                    backend,
                    &statements,
                    self.config.observation.clone(),
                )?;
                self.drive(&s, &keys, &payload, &counter)
            }
        };

        if let Err(e) = statements.close() {
            warn!(target: "eventbench::run", error = %e, "closing statements failed");
        }
        let report_lines = reporter.stop();
        let stats = stats?;

        let rows_before_teardown = match backend.count_rows() {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(target: "eventbench::run", error = %e, "could not count rows");
                None
            }
        };
        let rows_cleared = teardown.finish();

        let summary = RunSummary {
            strategy,
            workers: self.config.concurrency,
            successes: stats.successes,
            failures: stats.failures,
            rows_before_teardown,
            rows_cleared,
            elapsed: started.elapsed(),
            cancelled_during_startup: false,
        };
        info!(
            target: "eventbench::run",
            successes = summary.successes,
            failures = summary.failures,
            rows = ?summary.rows_before_teardown,
            report_lines,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "benchmark finished"
        );
        Ok(summary)
    }

    /// Run the workers, plus a timer thread when a duration is configured
    fn drive<S: PersistenceStrategy>(
        &self,
        strategy: &S,
        keys: &[EventKey],
        payload: &Payload,
        counter: &ThroughputCounter,
    ) -> Result<WorkerStats> {
        let pool = WorkerPool::new(strategy, keys, payload, counter, &self.cancel)?;
        thread::scope(|scope| {
            if let Some(duration) = self.config.duration() {
                let cancel = &self.cancel;
                thread::Builder::new()
                    .name("eventbench-timer".to_string())
                    .spawn_scoped(scope, move || {
                        if !cancel.wait_timeout(duration) {
                            info!(target: "eventbench::run", ?duration, "duration elapsed, stopping");
                            cancel.cancel();
                        }
                    })?;
            }
            pool.run(self.config.concurrency)
        })
    }
}
