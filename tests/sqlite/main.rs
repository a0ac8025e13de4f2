//! SQLite backend: transactional strategy end to end on a temp file.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use eventbench::{run_target, Error, SqliteBackend, SqliteConfig, StrategyKind};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn open(dir: &TempDir, connections: usize) -> SqliteBackend {
    let backend = SqliteBackend::open(SqliteConfig {
        path: dir.path().join("events.db"),
        connections,
        busy_timeout: Duration::from_secs(10),
    })
    .unwrap();
    backend.ensure_schema().unwrap();
    backend
}

#[test]
fn concurrent_read_modify_write_keeps_one_row_per_key() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir, 4);
    let statements = transactional_statements(&backend);
    let strategy = TransactionalStrategy::new(&backend, &statements).unwrap();
    let keys = generate_key_set(3);

    thread::scope(|s| {
        for w in 0..6usize {
            let strategy = &strategy;
            let keys = &keys;
            s.spawn(move || {
                let token = CancellationToken::new();
                for i in 0..20 {
                    strategy
                        .apply(&keys[(w + i) % keys.len()], &payload(w as u8), &token)
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(backend.count_rows().unwrap(), 3);
    assert_eq!(backend.clear_all_rows().unwrap(), 3);
    assert_eq!(backend.count_rows().unwrap(), 0);
}

#[test]
fn upsert_is_not_available() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir, 1);
    let err = StatementSet::prepare(&backend, &[StatementKind::Upsert], &CancellationToken::new())
        .err()
        .unwrap();
    assert!(matches!(err, Error::Unsupported { .. }));
}

#[test]
fn run_target_uses_transactional() {
    let dir = TempDir::new().unwrap();
    let config = BenchConfig {
        backend_target: format!("sqlite:{}", dir.path().join("run.db").display()),
        ..short_run_config(10, 4, 1)
    };
    let sink = SharedBuf::default();

    let summary = run_target(&config, &CancellationToken::new(), Box::new(sink.clone())).unwrap();

    assert_eq!(summary.strategy, StrategyKind::Transactional);
    assert!(summary.successes > 0);
    assert!(summary.rows_before_teardown.unwrap() <= 10);
    for line in sink.lines() {
        assert!(parse_report_line(&line).is_some(), "bad line {:?}", line);
    }
}

#[test]
fn explicit_upsert_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let config = BenchConfig {
        backend_target: format!("sqlite:{}", dir.path().join("run.db").display()),
        strategy: StrategyChoice::Upsert,
        ..short_run_config(10, 2, 1)
    };
    let err = run_target(&config, &CancellationToken::new(), Box::new(SharedBuf::default()))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
