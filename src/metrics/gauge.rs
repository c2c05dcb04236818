//! Gauges
//!
//! Arbitrarily settable values: [`Gauge`] holds an `i64`, [`GaugeFloat64`]
//! holds an `f64` stored as its bit pattern so both stay lock-free.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

// =============================================================================
// Gauge
// =============================================================================

/// Integer gauge metric
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    /// Create a new gauge at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored value
    pub fn update(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Increment by `delta`
    pub fn inc(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Decrement by `delta`
    pub fn dec(&self, delta: i64) {
        self.value.fetch_sub(delta, Ordering::Relaxed);
    }

    /// Current value
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Point-in-time, read-only copy
    pub fn snapshot(&self) -> GaugeSnapshot {
        GaugeSnapshot(self.value())
    }
}

/// Read-only copy of a [`Gauge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeSnapshot(i64);

impl GaugeSnapshot {
    /// Value at the time the snapshot was taken
    pub fn value(&self) -> i64 {
        self.0
    }
}

// =============================================================================
// GaugeFloat64
// =============================================================================

/// Floating-point gauge metric
#[derive(Debug)]
pub struct GaugeFloat64 {
    bits: AtomicU64,
}

impl GaugeFloat64 {
    /// Create a new gauge at 0.0
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Replace the stored value
    pub fn update(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Current value
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Point-in-time, read-only copy
    pub fn snapshot(&self) -> GaugeFloat64Snapshot {
        GaugeFloat64Snapshot(self.value())
    }
}

impl Default for GaugeFloat64 {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only copy of a [`GaugeFloat64`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeFloat64Snapshot(f64);

impl GaugeFloat64Snapshot {
    /// Value at the time the snapshot was taken
    pub fn value(&self) -> f64 {
        self.0
    }
}
