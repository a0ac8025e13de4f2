//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

pub use eventbench::{
    generate_key_set, with_transaction, Backend, BenchConfig, CancellationToken, CompositeKey,
    EventKey, EventRecord, MemoryBackend, MemoryConfig, ObservationConfig, Payload,
    PersistenceStrategy, SqlValue, StatementKind, StatementSet, StrategyChoice, Transaction,
    TransactionalStrategy, UpsertOutcome, UpsertStrategy, WriteOutcome,
};

// ============================================================================
// Backends
// ============================================================================

/// Memory backend with the schema already created
pub fn memory_backend(connections: usize) -> MemoryBackend {
    let backend = MemoryBackend::new(MemoryConfig {
        connections,
        lock_wait_timeout: Duration::from_secs(10),
    });
    backend.ensure_schema().expect("create schema");
    backend
}

/// Statements needed by the transactional strategy
pub fn transactional_statements<B: Backend>(backend: &B) -> StatementSet<'_, B> {
    StatementSet::prepare(
        backend,
        &[
            StatementKind::Lookup,
            StatementKind::Insert,
            StatementKind::Update,
        ],
        &CancellationToken::new(),
    )
    .expect("prepare transactional statements")
}

/// Statement needed by the upsert strategy
pub fn upsert_statements<B: Backend>(backend: &B) -> StatementSet<'_, B> {
    StatementSet::prepare(backend, &[StatementKind::Upsert], &CancellationToken::new())
        .expect("prepare upsert statement")
}

/// Fixed observation
pub fn observation(status: i64, timestamp: i64) -> ObservationConfig {
    ObservationConfig {
        status,
        timestamp: Some(timestamp),
    }
}

/// One upsert of `(status, timestamp)` for `key`
pub fn upsert_once<B: Backend>(
    backend: &B,
    statements: &StatementSet<'_, B>,
    key: &EventKey,
    status: i64,
    timestamp: i64,
) -> UpsertOutcome {
    let strategy = UpsertStrategy::new(backend, statements, observation(status, timestamp))
        .expect("bind upsert strategy");
    match strategy
        .apply(key, &payload(timestamp as u8), &CancellationToken::new())
        .expect("upsert")
    {
        WriteOutcome::Upserted(outcome) => outcome,
        other => panic!("expected upsert outcome, got {:?}", other),
    }
}

/// Row stored for `key` in the memory backend
pub fn stored_row(backend: &MemoryBackend, key: &EventKey) -> Option<EventRecord> {
    backend
        .snapshot_row(&CompositeKey::from_event_key(key))
        .expect("read row")
}

/// Read-modify-write whose payload is its commit sequence number
///
/// The number is drawn after the lookup, while the key lock is held, so
/// sequence order on one key is commit order. Returns the number written.
pub fn sequenced_write<B: Backend>(
    backend: &B,
    statements: &StatementSet<'_, B>,
    key: &EventKey,
    sequence: &AtomicU64,
) -> u64 {
    let lookup = statements.get(StatementKind::Lookup).expect("lookup prepared");
    let insert = statements.get(StatementKind::Insert).expect("insert prepared");
    let update = statements.get(StatementKind::Update).expect("update prepared");
    let cancel = CancellationToken::new();

    with_transaction(backend, &cancel, |tx| {
        let key_params: [SqlValue; 3] = [key.into(), key.into(), key.into()];
        let found = tx.query_row(lookup, &key_params, &cancel)?;
        let seq = sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let body = SqlValue::from(&sequence_payload(seq));
        match found {
            None => tx.execute(insert, &[key.into(), key.into(), key.into(), body], &cancel)?,
            Some(_) => tx.execute(update, &[body, key.into(), key.into(), key.into()], &cancel)?,
        };
        Ok(seq)
    })
    .expect("sequenced write")
}

// ============================================================================
// Payloads
// ============================================================================

/// Single-byte payload
pub fn payload(byte: u8) -> Payload {
    Payload::from(vec![byte])
}

/// Payload carrying a commit sequence number
pub fn sequence_payload(seq: u64) -> Payload {
    Payload::from(seq.to_le_bytes().to_vec())
}

// ============================================================================
// Report capture
// ============================================================================

/// Cloneable in-memory report sink
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    /// Captured output
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().clone()).expect("utf-8 report output")
    }

    /// Captured lines
    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Parse a report line, returning the count
pub fn parse_report_line(line: &str) -> Option<u64> {
    line.strip_suffix(" events/sec")?.parse().ok()
}

// ============================================================================
// Configuration
// ============================================================================

/// Small memory-backend run that stops on its own
pub fn short_run_config(event_count: usize, concurrency: usize, secs: u64) -> BenchConfig {
    BenchConfig {
        concurrency,
        connections: concurrency.min(4),
        event_count,
        report_interval_ms: 100,
        duration_secs: Some(secs),
        ..BenchConfig::default()
    }
}
