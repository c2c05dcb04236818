//! Exponentially-Weighted Moving Average
//!
//! Rate estimator driven by an external clock. Producers call
//! [`Ewma::update`] with event counts; a scheduler calls [`Ewma::tick`] at a
//! fixed cadence to fold the accumulated events into the decayed rate.
//!
//! The 1/5/15-minute constructors derive their smoothing constant for a
//! 5-second tick (`α = 1 - e^(-5/60/W)`), so they are only correct when ticked
//! every [`TICK_INTERVAL_SECS`] seconds.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

/// Tick cadence the 1/5/15-minute smoothing constants are derived for.
pub const TICK_INTERVAL_SECS: i64 = 5;

const NANOS_PER_SEC: f64 = 1e9;

/// Smoothing constant for a window of `minutes` at a 5 second tick.
pub fn alpha_for_window(minutes: f64) -> f64 {
    1.0 - (-(TICK_INTERVAL_SECS as f64) / 60.0 / minutes).exp()
}

#[derive(Debug, Default)]
struct RateState {
    rate: f64,
    init: bool,
}

/// Exponentially-weighted moving average metric
#[derive(Debug)]
pub struct Ewma {
    uncounted: AtomicI64,
    alpha: f64,
    state: Mutex<RateState>,
}

impl Ewma {
    /// Create an EWMA with an explicit smoothing constant
    pub fn new(alpha: f64) -> Self {
        Self {
            uncounted: AtomicI64::new(0),
            alpha,
            state: Mutex::new(RateState::default()),
        }
    }

    /// One-minute moving average
    pub fn one_minute() -> Self {
        Self::new(alpha_for_window(1.0))
    }

    /// Five-minute moving average
    pub fn five_minutes() -> Self {
        Self::new(alpha_for_window(5.0))
    }

    /// Fifteen-minute moving average
    pub fn fifteen_minutes() -> Self {
        Self::new(alpha_for_window(15.0))
    }

    /// Smoothing constant
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Add `n` uncounted events
    pub fn update(&self, n: i64) {
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    /// Fold the events accumulated since the last tick into the rate.
    ///
    /// The first tick initializes the rate to the instant rate; later ticks
    /// blend towards it by `alpha`.
    pub fn tick(&self, interval_secs: i64) {
        let count = self.uncounted.swap(0, Ordering::Relaxed);
        let instant_rate = count as f64 / (NANOS_PER_SEC * interval_secs as f64);

        let mut state = self.state.lock();
        if state.init {
            state.rate += self.alpha * (instant_rate - state.rate);
        } else {
            state.init = true;
            state.rate = instant_rate;
        }
    }

    /// Moving average rate in events per second
    pub fn rate(&self) -> f64 {
        self.state.lock().rate * NANOS_PER_SEC
    }

    /// Point-in-time, read-only copy
    pub fn snapshot(&self) -> EwmaSnapshot {
        EwmaSnapshot(self.rate())
    }
}

/// Read-only copy of an [`Ewma`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwmaSnapshot(f64);

impl EwmaSnapshot {
    /// Rate at the time the snapshot was taken
    pub fn rate(&self) -> f64 {
        self.0
    }
}
