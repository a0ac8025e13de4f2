//! Cancellation: no new operation after the token fires, waits unblock.

use crate::common::*;
use eventbench::{Error, Result, SqlValue, ThroughputCounter, WorkerPool};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Wraps a strategy; cancels after `limit` calls and flags any call made
/// once the token is set
struct Hooked<'a, S> {
    inner: &'a S,
    limit: u64,
    calls: AtomicU64,
    late_call: AtomicBool,
    token: CancellationToken,
}

impl<S: PersistenceStrategy> PersistenceStrategy for Hooked<'_, S> {
    fn apply(
        &self,
        key: &EventKey,
        payload: &Payload,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome> {
        if cancel.is_cancelled() {
            self.late_call.store(true, Ordering::SeqCst);
        }
        let result = self.inner.apply(key, payload, cancel);
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.limit {
            self.token.cancel();
        }
        result
    }
}

#[test]
fn single_worker_stops_at_cancel() {
    let backend = memory_backend(1);
    let statements = transactional_statements(&backend);
    let inner = TransactionalStrategy::new(&backend, &statements).unwrap();
    let token = CancellationToken::new();
    let hooked = Hooked {
        inner: &inner,
        limit: 25,
        calls: AtomicU64::new(0),
        late_call: AtomicBool::new(false),
        token: token.clone(),
    };
    let keys = generate_key_set(5);
    let payload = payload(1);
    let counter = ThroughputCounter::new();

    let pool = WorkerPool::new(&hooked, &keys, &payload, &counter, &token).unwrap();
    let stats = pool.run(1).unwrap();

    assert_eq!(hooked.calls.load(Ordering::SeqCst), 25);
    assert!(!hooked.late_call.load(Ordering::SeqCst));
    assert_eq!(stats.successes + stats.failures, 25);
    assert_eq!(counter.total(), stats.successes);
}

#[test]
fn many_workers_stop_promptly() {
    let backend = memory_backend(2);
    let statements = upsert_statements(&backend);
    let strategy = UpsertStrategy::new(&backend, &statements, observation(0, 1)).unwrap();
    let token = CancellationToken::new();
    let keys = generate_key_set(10);
    let payload = payload(1);
    let counter = ThroughputCounter::new();
    let pool = WorkerPool::new(&strategy, &keys, &payload, &counter, &token).unwrap();

    let stats = thread::scope(|s| {
        let handle = s.spawn(|| pool.run(8));
        thread::sleep(Duration::from_millis(100));
        let stop = Instant::now();
        token.cancel();
        let stats = handle.join().unwrap().unwrap();
        assert!(stop.elapsed() < Duration::from_secs(5));
        stats
    });

    assert!(stats.successes > 0);
    assert_eq!(counter.total(), stats.successes);
    assert!(backend.count_rows().unwrap() <= 10);
}

#[test]
fn cancel_interrupts_pool_wait() {
    let backend = memory_backend(1);
    let statements = transactional_statements(&backend);
    let lookup = statements.get(StatementKind::Lookup).unwrap();
    let token = CancellationToken::new();
    let key = EventKey::generate();

    // Hold the only session
    let holder = backend.begin(&token).unwrap();

    thread::scope(|s| {
        let waiter = s.spawn(|| {
            let params: [SqlValue; 3] = [(&key).into(), (&key).into(), (&key).into()];
            backend.query_row(lookup, &params, &token)
        });
        thread::sleep(Duration::from_millis(30));
        token.cancel();
        assert!(matches!(waiter.join().unwrap(), Err(Error::Cancelled)));
    });
    drop(holder);
}
