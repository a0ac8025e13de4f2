//! Worker pool
//!
//! `W` named threads hammer the key set until the cancellation token fires.
//! Worker `i` starts at key `i` and advances by a stride of `i`:
//!
//! ```text
//! cursor = i % len
//! loop { key = keys[cursor]; cursor = (cursor + i) % len }
//! ```
//!
//! so worker 0 always writes key 0 and a worker whose offset shares a factor
//! with the key-set length visits only a subset of keys. The uneven spread
//! is part of the workload.
//!
//! Failures are logged and counted, never retried. A failure while the token
//! is set is shutdown noise and is not logged.

use crate::strategy::PersistenceStrategy;
use eventbench_concurrency::ThroughputCounter;
use eventbench_core::{CancellationToken, Error, EventKey, Payload, Result};
use std::thread;
use tracing::{error, warn};

/// Deterministic stride rotation through `len` keys
#[derive(Debug, Clone)]
pub struct Rotation {
    cursor: usize,
    stride: usize,
    len: usize,
}

impl Rotation {
    /// Rotation for worker `offset` over `len` keys (`len` must be non-zero)
    pub fn new(offset: usize, len: usize) -> Self {
        assert!(len > 0, "rotation over an empty key set");
        Self {
            cursor: offset % len,
            stride: offset % len,
            len,
        }
    }
}

impl Iterator for Rotation {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.cursor;
        self.cursor = (self.cursor + self.stride) % self.len;
        Some(current)
    }
}

/// Per-worker totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Writes that succeeded
    pub successes: u64,
    /// Writes that failed
    pub failures: u64,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.successes += other.successes;
        self.failures += other.failures;
    }
}

/// A fixed set of workers sharing one strategy
pub struct WorkerPool<'a, S: PersistenceStrategy> {
    strategy: &'a S,
    keys: &'a [EventKey],
    payload: &'a Payload,
    counter: &'a ThroughputCounter,
    cancel: &'a CancellationToken,
}

impl<'a, S: PersistenceStrategy> WorkerPool<'a, S> {
    /// Create a pool over a non-empty key set
    pub fn new(
        strategy: &'a S,
        keys: &'a [EventKey],
        payload: &'a Payload,
        counter: &'a ThroughputCounter,
        cancel: &'a CancellationToken,
    ) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::config("key set must not be empty"));
        }
        Ok(Self {
            strategy,
            keys,
            payload,
            counter,
            cancel,
        })
    }

    /// Run `workers` threads until the token fires, then join them
    ///
    /// Returns the aggregated totals.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned. The token is
    /// cancelled first so already-running workers stop.
    pub fn run(&self, workers: usize) -> Result<WorkerStats> {
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            let mut spawn_err = None;
            for index in 0..workers {
                let spawned = thread::Builder::new()
                    .name(format!("eventbench-worker-{}", index))
                    .spawn_scoped(scope, move || self.worker_loop(index));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        self.cancel.cancel();
                        spawn_err = Some(e);
                        break;
                    }
                }
            }

            let mut total = WorkerStats::default();
            for (index, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(stats) => total += stats,
                    Err(_) => error!(target: "eventbench::worker", worker = index, "worker panicked"),
                }
            }
            match spawn_err {
                Some(e) => Err(Error::Io(e)),
                None => Ok(total),
            }
        })
    }

    fn worker_loop(&self, index: usize) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut rotation = Rotation::new(index, self.keys.len());
        while !self.cancel.is_cancelled() {
            let Some(slot) = rotation.next() else { break };
            let key = &self.keys[slot];
            match self.strategy.apply(key, self.payload, self.cancel) {
                Ok(_) => {
                    self.counter.increment();
                    stats.successes += 1;
                }
                Err(e) => {
                    stats.failures += 1;
                    if !self.cancel.is_cancelled() {
                        warn!(
                            target: "eventbench::worker",
                            worker = index,
                            key = %key,
                            error = %e,
                            "write failed"
                        );
                    }
                }
            }
        }
        stats
    }
}
