//! Counter
//!
//! Signed 64-bit cumulative total with lock-free updates.

use std::sync::atomic::{AtomicI64, Ordering};

/// Counter metric
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    /// Create a new counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` (may be negative)
    pub fn inc(&self, delta: i64) {
        self.count.fetch_add(delta, Ordering::Relaxed);
    }

    /// Subtract `delta`
    pub fn dec(&self, delta: i64) {
        self.count.fetch_sub(delta, Ordering::Relaxed);
    }

    /// Reset to zero
    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    /// Current count
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Point-in-time, read-only copy
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot(self.count())
    }
}

/// Read-only copy of a counter taken by [`Counter::snapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot(i64);

impl CounterSnapshot {
    /// Count at the time the snapshot was taken
    pub fn count(&self) -> i64 {
        self.0
    }
}
