//! Cooperative cancellation token
//!
//! One token is created per run and cloned into every worker, the backend
//! calls and the top-level wait point. Setting it is write-once: there is no
//! way to clear a cancelled token.
//!
//! # Memory Ordering
//!
//! `cancel()` stores with Release and readers load with Acquire, so anything
//! written before cancelling is visible to a thread that observes the flag.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TokenInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    fired: Condvar,
}

/// Shared cancellation flag with blocking waits
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a token in the clear state
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                lock: Mutex::new(()),
                fired: Condvar::new(),
            }),
        }
    }

    /// Set the token
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Take the lock so a waiter between its check and wait() cannot miss us
        let _guard = self.inner.lock.lock();
        self.inner.fired.notify_all();
        true
    }

    /// Whether the token has been set
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Return `Err(Error::Cancelled)` once the token is set
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Block until the token is set
    pub fn wait(&self) {
        let mut guard = self.inner.lock.lock();
        while !self.is_cancelled() {
            self.inner.fired.wait(&mut guard);
        }
    }

    /// Block until the token is set or `timeout` elapses
    ///
    /// Returns `true` if the token is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while !self.is_cancelled() {
            if self.inner.fired.wait_until(&mut guard, deadline).timed_out() {
                return self.is_cancelled();
            }
        }
        true
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
