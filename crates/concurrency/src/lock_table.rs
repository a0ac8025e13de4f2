//! Exclusive row locks keyed by row identity
//!
//! A lock may be taken on a key whether or not the row exists, which is what
//! makes a locking lookup followed by an insert safe: a second transaction
//! looking up the same absent key waits instead of also deciding to insert.
//!
//! Locks are owned by an opaque owner id (a transaction id) and are
//! re-entrant for that owner. Waits observe the cancellation token and a
//! lock-wait timeout.

use eventbench_core::{CancellationToken, Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// How often a blocked waiter re-checks the cancellation token
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Table of exclusive key locks
pub struct LockTable<K> {
    held: Mutex<HashMap<K, u64>>,
    released: Condvar,
    wait_timeout: Duration,
}

impl<K: Hash + Eq + Clone> LockTable<K> {
    /// Create an empty lock table
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            wait_timeout,
        }
    }

    /// Acquire the lock on `key` for `owner`
    ///
    /// Returns `true` if the lock was newly acquired, `false` if `owner`
    /// already held it.
    ///
    /// # Errors
    ///
    /// `Error::Cancelled` if the token fires while waiting,
    /// `Error::LockWaitTimeout` if the wait exceeds the configured timeout.
    pub fn acquire(&self, owner: u64, key: &K, cancel: &CancellationToken) -> Result<bool> {
        let deadline = Instant::now() + self.wait_timeout;
        let mut held = self.held.lock();
        loop {
            match held.get(key) {
                None => {
                    held.insert(key.clone(), owner);
                    return Ok(true);
                }
                Some(current) if *current == owner => return Ok(false),
                Some(_) => {}
            }

            cancel.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::LockWaitTimeout(self.wait_timeout));
            }
            let wait_until = deadline.min(now + CANCEL_POLL);
            self.released.wait_until(&mut held, wait_until);
        }
    }

    /// Acquire a lock released automatically when the guard drops
    pub fn lock<'a>(
        &'a self,
        owner: u64,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<LockGuard<'a, K>> {
        let acquired = self.acquire(owner, key, cancel)?;
        Ok(LockGuard {
            table: self,
            owner,
            key: acquired.then(|| key.clone()),
        })
    }

    /// Release every listed key held by `owner`
    pub fn release_all<'k>(&self, owner: u64, keys: impl IntoIterator<Item = &'k K>)
    where
        K: 'k,
    {
        let mut held = self.held.lock();
        let mut released_any = false;
        for key in keys {
            if held.get(key) == Some(&owner) {
                held.remove(key);
                released_any = true;
            }
        }
        if released_any {
            self.released.notify_all();
        }
    }

    /// Number of keys currently locked
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    /// Current holder of `key`
    pub fn holder(&self, key: &K) -> Option<u64> {
        self.held.lock().get(key).copied()
    }
}

/// Lock on a single key, released on drop
pub struct LockGuard<'a, K: Hash + Eq + Clone> {
    table: &'a LockTable<K>,
    owner: u64,
    /// `None` when the owner already held the lock before this guard
    key: Option<K>,
}

impl<K: Hash + Eq + Clone> Drop for LockGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.table.release_all(self.owner, std::iter::once(&key));
        }
    }
}
