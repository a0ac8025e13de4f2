//! Transactional read-modify-write: one row per key, last write wins.

use crate::common::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

#[test]
fn write_then_rewrite_keeps_one_row() {
    let backend = memory_backend(4);
    let statements = transactional_statements(&backend);
    let strategy = TransactionalStrategy::new(&backend, &statements).unwrap();
    let token = CancellationToken::new();
    let key = EventKey::generate();

    assert_eq!(
        strategy.apply(&key, &payload(1), &token).unwrap(),
        WriteOutcome::Inserted
    );
    assert_eq!(backend.count_rows().unwrap(), 1);

    assert_eq!(
        strategy.apply(&key, &payload(2), &token).unwrap(),
        WriteOutcome::Updated
    );
    assert_eq!(backend.count_rows().unwrap(), 1);
    assert_eq!(stored_row(&backend, &key).unwrap().serialized, payload(2));
}

#[test]
fn concurrent_writers_on_one_key_never_duplicate() {
    let backend = memory_backend(3);
    let statements = transactional_statements(&backend);
    let strategy = TransactionalStrategy::new(&backend, &statements).unwrap();
    let key = EventKey::generate();
    let writers = 12u8;

    let failures: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let strategy = &strategy;
                let key = &key;
                s.spawn(move || {
                    let token = CancellationToken::new();
                    (0..40)
                        .filter(|_| strategy.apply(key, &payload(w), &token).is_err())
                        .count()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(failures, 0, "locking lookup must prevent duplicate inserts");
    assert_eq!(backend.count_rows().unwrap(), 1);
    let row = stored_row(&backend, &key).unwrap();
    assert!(row.serialized.as_bytes()[0] < writers);
    assert_eq!(backend.held_locks(), 0);
    assert!(backend.sessions().peak_in_use() <= 3);
}

#[test]
fn last_committed_write_wins() {
    let backend = memory_backend(4);
    let statements = transactional_statements(&backend);
    let strategy = TransactionalStrategy::new(&backend, &statements).unwrap();
    let key = EventKey::generate();
    let token = CancellationToken::new();

    // Writers run strictly one after another, so the last one is known
    for w in 0..5u8 {
        thread::scope(|s| {
            s.spawn(|| strategy.apply(&key, &payload(w), &token).unwrap());
        });
    }
    assert_eq!(stored_row(&backend, &key).unwrap().serialized, payload(4));
}

#[test]
fn stored_payload_is_from_the_last_commit() {
    let backend = memory_backend(4);
    let statements = transactional_statements(&backend);
    let key = EventKey::generate();
    let sequence = AtomicU64::new(0);

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..25 {
                    sequenced_write(&backend, &statements, &key, &sequence);
                }
            });
        }
    });

    let last = sequence.load(Ordering::SeqCst);
    assert_eq!(last, 200);
    assert_eq!(backend.count_rows().unwrap(), 1);
    assert_eq!(
        stored_row(&backend, &key).unwrap().serialized,
        sequence_payload(last)
    );
}

#[test]
fn many_keys_many_workers_one_row_per_key() {
    let backend = memory_backend(4);
    let statements = transactional_statements(&backend);
    let strategy = TransactionalStrategy::new(&backend, &statements).unwrap();
    let keys = generate_key_set(16);

    thread::scope(|s| {
        for w in 0..8usize {
            let strategy = &strategy;
            let keys = &keys;
            s.spawn(move || {
                let token = CancellationToken::new();
                for i in 0..64 {
                    let key = &keys[(w + i) % keys.len()];
                    strategy.apply(key, &payload(w as u8), &token).unwrap();
                }
            });
        }
    });

    assert_eq!(backend.count_rows().unwrap(), 16);
    let distinct: HashSet<_> = keys.iter().map(|k| k.as_str().to_string()).collect();
    assert_eq!(distinct.len(), 16);
    for key in &keys {
        assert!(stored_row(&backend, key).is_some());
    }
}
