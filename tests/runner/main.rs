//! End-to-end benchmark runs against the in-memory backend.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use eventbench::{run_target, BenchmarkRunner, Error, StrategyKind};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn timed_run_reports_and_tears_down() {
    let config = short_run_config(10, 4, 1);
    let sink = SharedBuf::default();

    let summary = run_target(&config, &CancellationToken::new(), Box::new(sink.clone())).unwrap();

    assert!(!summary.cancelled_during_startup);
    assert_eq!(summary.workers, 4);
    assert!(summary.successes > 0);
    let rows = summary.rows_before_teardown.unwrap();
    assert!(rows >= 1 && rows <= 10, "rows = {}", rows);
    assert_eq!(summary.rows_cleared, Some(rows));

    let lines = sink.lines();
    assert!(!lines.is_empty());
    let reported: u64 = lines
        .iter()
        .map(|line| parse_report_line(line).unwrap_or_else(|| panic!("bad line {:?}", line)))
        .sum();
    assert!(reported <= summary.successes);
}

#[test]
fn external_cancel_stops_run() {
    let config = BenchConfig {
        duration_secs: None,
        ..short_run_config(10, 4, 1)
    };
    let token = CancellationToken::new();
    let sink = SharedBuf::default();

    let summary = thread::scope(|s| {
        let handle = s.spawn(|| run_target(&config, &token, Box::new(sink.clone())));
        thread::sleep(Duration::from_millis(300));
        let stop = Instant::now();
        token.cancel();
        let summary = handle.join().unwrap().unwrap();
        assert!(stop.elapsed() < Duration::from_secs(5));
        summary
    });

    assert!(summary.successes > 0);
    assert!(summary.rows_before_teardown.unwrap() <= 10);
    for line in sink.lines() {
        assert!(parse_report_line(&line).is_some(), "bad line {:?}", line);
    }
}

#[test]
fn auto_picks_upsert_on_memory() {
    let backend = memory_backend(4);
    let runner = BenchmarkRunner::new(short_run_config(5, 2, 1), CancellationToken::new());

    let summary = runner.run(&backend, Box::new(SharedBuf::default())).unwrap();

    assert_eq!(summary.strategy, StrategyKind::Upsert);
    assert_eq!(backend.count_rows().unwrap(), 0);
    assert_eq!(backend.open_statement_count(), 0);
    assert_eq!(backend.held_locks(), 0);
}

#[test]
fn transactional_run_leaves_no_state_behind() {
    let backend = memory_backend(2);
    let config = BenchConfig {
        strategy: StrategyChoice::Transactional,
        ..short_run_config(10, 6, 1)
    };
    let runner = BenchmarkRunner::new(config, CancellationToken::new());

    let summary = runner.run(&backend, Box::new(SharedBuf::default())).unwrap();

    assert_eq!(summary.strategy, StrategyKind::Transactional);
    assert!(summary.successes > 0);
    assert!(summary.rows_before_teardown.unwrap() <= 10);
    assert_eq!(backend.count_rows().unwrap(), 0);
    assert_eq!(backend.open_statement_count(), 0);
    assert!(backend.sessions().peak_in_use() <= 2);
}

#[test]
fn cancelled_before_start_is_clean() {
    let token = CancellationToken::new();
    token.cancel();
    let sink = SharedBuf::default();

    let summary = run_target(&short_run_config(10, 4, 1), &token, Box::new(sink.clone())).unwrap();

    assert!(summary.cancelled_during_startup);
    assert_eq!(summary.successes, 0);
    assert!(sink.text().is_empty());
}

#[test]
fn invalid_config_is_rejected() {
    let config = BenchConfig {
        event_count: 0,
        ..BenchConfig::default()
    };
    let err = run_target(&config, &CancellationToken::new(), Box::new(SharedBuf::default()))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn unknown_target_is_rejected() {
    let config = BenchConfig {
        backend_target: "oracle://nope".to_string(),
        ..BenchConfig::default()
    };
    let err = run_target(&config, &CancellationToken::new(), Box::new(SharedBuf::default()))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
