//! Meter
//!
//! Counts events and tracks their 1/5/15-minute moving rates plus the mean
//! rate since creation.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use super::ewma::{Ewma, TICK_INTERVAL_SECS};

/// Meter metric
#[derive(Debug)]
pub struct Meter {
    count: AtomicI64,
    rate1: Ewma,
    rate5: Ewma,
    rate15: Ewma,
    start: Instant,
}

impl Meter {
    /// Create a new meter
    pub fn new() -> Self {
        Self {
            count: AtomicI64::new(0),
            rate1: Ewma::one_minute(),
            rate5: Ewma::five_minutes(),
            rate15: Ewma::fifteen_minutes(),
            start: Instant::now(),
        }
    }

    /// Record `n` events
    pub fn mark(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
        self.rate1.update(n);
        self.rate5.update(n);
        self.rate15.update(n);
    }

    /// Advance the moving averages by one 5 second tick
    pub fn tick(&self) {
        self.rate1.tick(TICK_INTERVAL_SECS);
        self.rate5.tick(TICK_INTERVAL_SECS);
        self.rate15.tick(TICK_INTERVAL_SECS);
    }

    /// Total events recorded
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Point-in-time, read-only copy
    pub fn snapshot(&self) -> MeterSnapshot {
        let count = self.count();
        MeterSnapshot {
            count,
            rate1: self.rate1.rate(),
            rate5: self.rate5.rate(),
            rate15: self.rate15.rate(),
            rate_mean: mean_rate(count, self.start.elapsed()),
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

fn mean_rate(count: i64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        count as f64 / secs
    }
}

/// Read-only copy of a [`Meter`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSnapshot {
    pub count: i64,
    pub rate1: f64,
    pub rate5: f64,
    pub rate15: f64,
    pub rate_mean: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_counts_marks() {
        let meter = Meter::new();
        meter.mark(3);
        meter.mark(7);
        assert_eq!(meter.count(), 10);
        assert_eq!(meter.snapshot().count, 10);
    }

    #[test]
    fn test_meter_rates_after_tick() {
        let meter = Meter::new();
        meter.mark(50);
        meter.tick();

        let snapshot = meter.snapshot();
        // First tick initializes every window to the instant rate
        assert!((snapshot.rate1 - 10.0).abs() < 1e-9);
        assert!((snapshot.rate5 - 10.0).abs() < 1e-9);
        assert!((snapshot.rate15 - 10.0).abs() < 1e-9);

        meter.tick();
        let snapshot = meter.snapshot();
        // Shorter windows decay faster
        assert!(snapshot.rate1 < snapshot.rate5);
        assert!(snapshot.rate5 < snapshot.rate15);
    }

    #[test]
    fn test_mean_rate() {
        assert_eq!(mean_rate(10, Duration::ZERO), 0.0);
        assert!((mean_rate(10, Duration::from_secs(5)) - 2.0).abs() < 1e-12);
    }
}
