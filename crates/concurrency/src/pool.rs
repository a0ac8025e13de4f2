//! Bounded connection pool
//!
//! Holds at most `capacity` connections. Callers block until one is idle;
//! the wait observes the cancellation token. Connections are returned to the
//! pool when the guard drops, so a panicking or erroring caller cannot leak a
//! slot.
//!
//! More workers than connections is the normal configuration: the queueing
//! at this pool is part of what the benchmark measures.

use eventbench_core::{CancellationToken, Result};
use parking_lot::{Condvar, Mutex};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How often a blocked caller re-checks the cancellation token
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Fixed-size pool of connections of type `T`
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    returned: Condvar,
    capacity: usize,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
}

impl<T> Pool<T> {
    /// Create a pool owning the given connections
    pub fn new(connections: Vec<T>) -> Self {
        let capacity = connections.len();
        Self {
            idle: Mutex::new(connections),
            returned: Condvar::new(),
            capacity,
            in_use: AtomicUsize::new(0),
            peak_in_use: AtomicUsize::new(0),
        }
    }

    /// Check out a connection, waiting for one to become idle
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if the token fires before a connection is
    /// available.
    pub fn acquire(&self, cancel: &CancellationToken) -> Result<PoolGuard<'_, T>> {
        cancel.check()?;
        let mut idle = self.idle.lock();
        loop {
            if let Some(conn) = idle.pop() {
                let now_in_use = self.in_use.fetch_add(1, Ordering::Relaxed) + 1;
                self.peak_in_use.fetch_max(now_in_use, Ordering::Relaxed);
                return Ok(PoolGuard {
                    pool: self,
                    conn: Some(conn),
                });
            }
            cancel.check()?;
            self.returned.wait_for(&mut idle, CANCEL_POLL);
        }
    }

    /// Maximum number of connections
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Connections currently checked out
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Highest number of connections checked out at once
    pub fn peak_in_use(&self) -> usize {
        self.peak_in_use.load(Ordering::Relaxed)
    }

    /// Apply `f` to every idle connection
    ///
    /// Used for maintenance at startup and shutdown, when no connection is
    /// checked out.
    pub fn for_each_idle(&self, mut f: impl FnMut(&mut T)) {
        let mut idle = self.idle.lock();
        for conn in idle.iter_mut() {
            f(conn);
        }
    }

    fn give_back(&self, conn: T) {
        let mut idle = self.idle.lock();
        idle.push(conn);
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        self.returned.notify_one();
    }
}

/// A checked-out connection, returned to the pool on drop
pub struct PoolGuard<'a, T> {
    pool: &'a Pool<T>,
    conn: Option<T>,
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<T> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}
