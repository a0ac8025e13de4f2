//! MySQL backend tests.
//!
//! Skipped unless `EVENTBENCH_MYSQL_DSN` names a reachable server, e.g.
//! `mysql://root@127.0.0.1:3306/eventbench`.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use eventbench::{run_target, Error, MysqlBackend, MysqlConfig, StrategyKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

// Tests share one table; run them one at a time
static SERIAL: Mutex<()> = Mutex::new(());

fn dsn() -> Option<String> {
    std::env::var("EVENTBENCH_MYSQL_DSN").ok().filter(|s| !s.is_empty())
}

fn connect(dsn: String, connections: usize) -> MysqlBackend {
    let backend = MysqlBackend::connect(MysqlConfig {
        dsn,
        connections,
        lock_wait_timeout: Duration::from_secs(10),
    })
    .unwrap();
    backend.ensure_schema().unwrap();
    backend.clear_all_rows().unwrap();
    backend
}

#[test]
fn insert_then_update_through_row_locks() {
    let Some(dsn) = dsn() else {
        eprintln!("EVENTBENCH_MYSQL_DSN not set, skipping");
        return;
    };
    let _serial = SERIAL.lock();
    let backend = connect(dsn, 2);
    let statements = transactional_statements(&backend);
    let strategy = TransactionalStrategy::new(&backend, &statements).unwrap();
    let token = CancellationToken::new();
    let key = EventKey::generate();

    assert_eq!(
        strategy.apply(&key, &payload(1), &token).unwrap(),
        WriteOutcome::Inserted
    );
    assert_eq!(
        strategy.apply(&key, &payload(2), &token).unwrap(),
        WriteOutcome::Updated
    );
    assert_eq!(backend.count_rows().unwrap(), 1);

    statements.close().unwrap();
    assert_eq!(backend.open_statement_count(), 0);
    backend.clear_all_rows().unwrap();
}

#[test]
fn first_writers_of_a_key_never_collide() {
    let Some(dsn) = dsn() else {
        return;
    };
    let _serial = SERIAL.lock();
    let writers = 8;
    let rounds = 50;
    let backend = connect(dsn, writers);
    let statements = transactional_statements(&backend);
    let strategy = TransactionalStrategy::new(&backend, &statements).unwrap();
    let failures = AtomicUsize::new(0);
    let first_error = Mutex::new(None);

    for _ in 0..rounds {
        let key = EventKey::generate();
        let barrier = Barrier::new(writers);
        thread::scope(|s| {
            for w in 0..writers {
                let (strategy, key, barrier) = (&strategy, &key, &barrier);
                let (failures, first_error) = (&failures, &first_error);
                s.spawn(move || {
                    barrier.wait();
                    let token = CancellationToken::new();
                    if let Err(e) = strategy.apply(key, &payload(w as u8), &token) {
                        failures.fetch_add(1, Ordering::Relaxed);
                        first_error.lock().get_or_insert(e.to_string());
                    }
                });
            }
        });
    }

    assert_eq!(
        failures.load(Ordering::Relaxed),
        0,
        "first error: {:?}",
        first_error.lock()
    );
    assert_eq!(backend.count_rows().unwrap(), rounds as u64);
    backend.clear_all_rows().unwrap();
}

#[test]
fn stored_payload_is_from_the_last_commit() {
    let Some(dsn) = dsn() else {
        return;
    };
    let _serial = SERIAL.lock();
    let backend = connect(dsn, 4);
    let statements = transactional_statements(&backend);
    let key = EventKey::generate();
    let sequence = AtomicU64::new(0);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..20 {
                    sequenced_write(&backend, &statements, &key, &sequence);
                }
            });
        }
    });

    let last = sequence.load(Ordering::SeqCst);
    let lookup = statements.get(StatementKind::Lookup).unwrap();
    let key_params: [SqlValue; 3] = [(&key).into(), (&key).into(), (&key).into()];
    let row = backend
        .query_row(lookup, &key_params, &CancellationToken::new())
        .unwrap()
        .unwrap();
    assert_eq!(row.get_blob(0).unwrap(), Some(sequence_payload(last)));
    backend.clear_all_rows().unwrap();
}

#[test]
fn duplicate_insert_reports_the_key() {
    let Some(dsn) = dsn() else {
        return;
    };
    let _serial = SERIAL.lock();
    let backend = connect(dsn, 1);
    let statements = transactional_statements(&backend);
    let insert = statements.get(StatementKind::Insert).unwrap();
    let key = EventKey::generate();
    let params: [SqlValue; 4] = [
        (&key).into(),
        (&key).into(),
        (&key).into(),
        SqlValue::from(&payload(1)),
    ];
    let token = CancellationToken::new();

    assert_eq!(backend.execute(insert, &params, &token).unwrap(), 1);
    let err = backend.execute(insert, &params, &token).unwrap_err();
    assert!(
        matches!(&err, Error::DuplicateKey(k) if *k == CompositeKey::from_event_key(&key)),
        "{}",
        err
    );
    backend.clear_all_rows().unwrap();
}

#[test]
fn upsert_is_not_available() {
    let Some(dsn) = dsn() else {
        return;
    };
    let _serial = SERIAL.lock();
    let backend = connect(dsn, 1);
    let err = StatementSet::prepare(&backend, &[StatementKind::Upsert], &CancellationToken::new())
        .err()
        .unwrap();
    assert!(matches!(err, Error::Unsupported { .. }));
}

#[test]
fn auto_run_picks_transactional() {
    let Some(dsn) = dsn() else {
        return;
    };
    let _serial = SERIAL.lock();
    let config = BenchConfig {
        backend_target: dsn,
        ..short_run_config(10, 4, 1)
    };

    let summary =
        run_target(&config, &CancellationToken::new(), Box::new(SharedBuf::default())).unwrap();

    assert_eq!(summary.strategy, StrategyKind::Transactional);
    assert!(summary.successes > 0);
    assert!(summary.rows_before_teardown.unwrap() <= 10);
}
