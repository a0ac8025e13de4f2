//! Atomic upsert: counter rules and the history ring.

use crate::common::*;
use eventbench::HISTORY_LEN;
use std::thread;

#[test]
fn counters_follow_status_sequence() {
    let backend = memory_backend(2);
    let statements = upsert_statements(&backend);
    let key = EventKey::generate();

    // ok
    let first = upsert_once(&backend, &statements, &key, 0, 100);
    assert_eq!(first.occurrences, 1);
    assert_eq!(first.occurrences_wm, 1);
    assert_eq!(first.last_ok, 100);

    // ok again
    let second = upsert_once(&backend, &statements, &key, 0, 101);
    assert_eq!(second.occurrences, 2);
    assert_eq!(second.occurrences_wm, 2);
    assert_eq!(second.last_ok, 101);

    // ok -> failing resets the high-water mark
    let third = upsert_once(&backend, &statements, &key, 1, 102);
    assert_eq!(third.occurrences, 1);
    assert_eq!(third.last_ok, 101);
    assert_eq!(third.occurrences_wm, 1);

    // failing -> ok keeps it
    let fourth = upsert_once(&backend, &statements, &key, 0, 103);
    assert_eq!(fourth.occurrences, 1);
    assert_eq!(fourth.occurrences_wm, 1);
    assert_eq!(fourth.last_ok, 103);

    assert_eq!(fourth.history_ts, vec![100, 101, 102, 103]);
    assert_eq!(fourth.history_status, vec![0, 0, 1, 0]);
}

#[test]
fn high_water_mark_holds_through_shorter_streak() {
    let backend = memory_backend(2);
    let statements = upsert_statements(&backend);
    let key = EventKey::generate();

    for ts in 1..=3 {
        upsert_once(&backend, &statements, &key, 2, ts);
    }
    // failing(2) -> failing(1): status change keeps wm
    let changed = upsert_once(&backend, &statements, &key, 1, 4);
    assert_eq!(changed.occurrences, 1);
    assert_eq!(changed.occurrences_wm, 3);

    // streak of 1s below the mark leaves it alone
    let again = upsert_once(&backend, &statements, &key, 1, 5);
    assert_eq!(again.occurrences, 2);
    assert_eq!(again.occurrences_wm, 3);
}

#[test]
fn first_failing_observation_has_no_last_ok() {
    let backend = memory_backend(2);
    let statements = upsert_statements(&backend);
    let outcome = upsert_once(&backend, &statements, &EventKey::generate(), 2, 50);
    assert_eq!(outcome.last_ok, 0);
    assert_eq!(outcome.previous_serialized, None);
}

#[test]
fn ring_slots_fill_in_order_then_wrap() {
    let backend = memory_backend(2);
    let statements = upsert_statements(&backend);
    let key = EventKey::generate();

    for i in 1..=25i64 {
        let outcome = upsert_once(&backend, &statements, &key, 0, i);
        let slot = ((i - 1) as usize % HISTORY_LEN) + 1;
        assert_eq!(outcome.history_ts[slot - 1], i, "write {} lands in slot {}", i, slot);
        assert_eq!(outcome.history_ts.len(), (i as usize).min(HISTORY_LEN));
    }

    let row = stored_row(&backend, &key).unwrap();
    let history = row.check.unwrap().history;
    assert_eq!(history.len(), HISTORY_LEN);
    assert_eq!(history.index(), 5);
    // slots 1..=5 were overwritten by writes 21..=25
    assert_eq!(history.timestamps()[0], 21);
    assert_eq!(history.timestamps()[5], 6);
}

#[test]
fn previous_payload_is_returned() {
    let backend = memory_backend(2);
    let statements = upsert_statements(&backend);
    let key = EventKey::generate();

    upsert_once(&backend, &statements, &key, 0, 7);
    let second = upsert_once(&backend, &statements, &key, 0, 8);
    assert_eq!(second.previous_serialized, Some(payload(7)));
    assert_eq!(stored_row(&backend, &key).unwrap().serialized, payload(8));
}

#[test]
fn concurrent_upserts_lose_no_updates() {
    let backend = memory_backend(4);
    let statements = upsert_statements(&backend);
    let strategy = UpsertStrategy::new(&backend, &statements, observation(0, 1)).unwrap();
    let key = EventKey::generate();
    let (writers, per_writer) = (8, 50);

    thread::scope(|s| {
        for _ in 0..writers {
            let strategy = &strategy;
            let key = &key;
            s.spawn(move || {
                let token = CancellationToken::new();
                for _ in 0..per_writer {
                    strategy.apply(key, &payload(0), &token).unwrap();
                }
            });
        }
    });

    let check = stored_row(&backend, &key).unwrap().check.unwrap();
    assert_eq!(check.occurrences, (writers * per_writer) as i64);
    assert_eq!(check.occurrences_wm, (writers * per_writer) as i64);
    assert_eq!(backend.count_rows().unwrap(), 1);
}
