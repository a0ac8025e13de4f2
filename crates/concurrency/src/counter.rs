//! Throughput counter shared by all workers
//!
//! # Memory Ordering
//!
//! `increment` uses Relaxed: the counter does not publish any other memory.
//! `sample_and_reset` is a single `swap(0)`, so every increment lands in
//! exactly one sample, either before or after the swap. No increment is lost
//! or counted twice across the reset boundary.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic count of successful operations since the last sample
#[derive(Debug, Default)]
pub struct ThroughputCounter {
    /// Successes since the last `sample_and_reset`
    window: AtomicU64,
    /// Successes since creation (never reset)
    total: AtomicU64,
}

impl ThroughputCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful operation
    #[inline]
    pub fn increment(&self) {
        self.window.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the count since the previous sample and reset it to zero
    #[inline]
    pub fn sample_and_reset(&self) -> u64 {
        self.window.swap(0, Ordering::AcqRel)
    }

    /// Lifetime total of successful operations
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}
