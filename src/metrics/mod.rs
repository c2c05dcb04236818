//! Metrics module
//!
//! Concurrent-safe metric primitives, the hierarchical registry that names
//! them, and the delta tracker that turns cumulative OS counters into
//! per-interval increments.
//!
//! Every metric kind is a variant of the closed [`Metric`] enum. Consumers
//! that need to render a metric go through [`Metric::snapshot`] and
//! [`MetricSnapshot::fields`] instead of matching on concrete types.

mod counter;
pub mod delta;
mod ewma;
mod gauge;
mod meter;
pub mod naming;
pub mod registry;

use std::fmt;
use std::sync::Arc;

pub use counter::{Counter, CounterSnapshot};
pub use delta::{calculate_delta, DeltaTracker};
pub use ewma::{alpha_for_window, Ewma, EwmaSnapshot, TICK_INTERVAL_SECS};
pub use gauge::{Gauge, GaugeFloat64, GaugeFloat64Snapshot, GaugeSnapshot};
pub use meter::{Meter, MeterSnapshot};
pub use naming::{make_metric, stringify_tags};
pub use registry::{
    get_or_register_counter, get_or_register_ewma, get_or_register_gauge,
    get_or_register_gauge_float64, get_or_register_meter, global_registry,
    set_global_registry, PrefixedRegistry, Registry, StandardRegistry,
};

// =============================================================================
// Metric
// =============================================================================

/// Kind of a registered metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    GaugeFloat64,
    Ewma,
    Meter,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::GaugeFloat64 => write!(f, "gauge_float64"),
            MetricKind::Ewma => write!(f, "ewma"),
            MetricKind::Meter => write!(f, "meter"),
        }
    }
}

/// A live, shareable metric
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    GaugeFloat64(Arc<GaugeFloat64>),
    Ewma(Arc<Ewma>),
    Meter(Arc<Meter>),
}

impl Metric {
    /// New counter at zero
    pub fn counter() -> Self {
        Metric::Counter(Arc::new(Counter::new()))
    }

    /// New integer gauge at zero
    pub fn gauge() -> Self {
        Metric::Gauge(Arc::new(Gauge::new()))
    }

    /// New float gauge at zero
    pub fn gauge_float64() -> Self {
        Metric::GaugeFloat64(Arc::new(GaugeFloat64::new()))
    }

    /// New one-minute EWMA
    pub fn ewma() -> Self {
        Metric::Ewma(Arc::new(Ewma::one_minute()))
    }

    /// New meter
    pub fn meter() -> Self {
        Metric::Meter(Arc::new(Meter::new()))
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::GaugeFloat64(_) => MetricKind::GaugeFloat64,
            Metric::Ewma(_) => MetricKind::Ewma,
            Metric::Meter(_) => MetricKind::Meter,
        }
    }

    /// Read-only copy of the current value(s)
    pub fn snapshot(&self) -> MetricSnapshot {
        match self {
            Metric::Counter(c) => MetricSnapshot::Counter(c.snapshot()),
            Metric::Gauge(g) => MetricSnapshot::Gauge(g.snapshot()),
            Metric::GaugeFloat64(g) => MetricSnapshot::GaugeFloat64(g.snapshot()),
            Metric::Ewma(e) => MetricSnapshot::Ewma(e.snapshot()),
            Metric::Meter(m) => MetricSnapshot::Meter(m.snapshot()),
        }
    }

    /// Advance rate estimators by one 5 second tick. No-op for other kinds.
    pub fn tick(&self) {
        match self {
            Metric::Ewma(e) => e.tick(TICK_INTERVAL_SECS),
            Metric::Meter(m) => m.tick(),
            Metric::Counter(_) | Metric::Gauge(_) | Metric::GaugeFloat64(_) => {}
        }
    }

    /// True when both handles point at the same instance
    pub fn same_instance(&self, other: &Metric) -> bool {
        match (self, other) {
            (Metric::Counter(a), Metric::Counter(b)) => Arc::ptr_eq(a, b),
            (Metric::Gauge(a), Metric::Gauge(b)) => Arc::ptr_eq(a, b),
            (Metric::GaugeFloat64(a), Metric::GaugeFloat64(b)) => Arc::ptr_eq(a, b),
            (Metric::Ewma(a), Metric::Ewma(b)) => Arc::ptr_eq(a, b),
            (Metric::Meter(a), Metric::Meter(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// A single numeric value of a snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{:.6}", v),
        }
    }
}

impl From<FieldValue> for serde_json::Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Int(v) => serde_json::Value::from(v),
            FieldValue::Float(v) => serde_json::Value::from(v),
        }
    }
}

/// Read-only copy of any metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricSnapshot {
    Counter(CounterSnapshot),
    Gauge(GaugeSnapshot),
    GaugeFloat64(GaugeFloat64Snapshot),
    Ewma(EwmaSnapshot),
    Meter(MeterSnapshot),
}

impl MetricSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSnapshot::Counter(_) => MetricKind::Counter,
            MetricSnapshot::Gauge(_) => MetricKind::Gauge,
            MetricSnapshot::GaugeFloat64(_) => MetricKind::GaugeFloat64,
            MetricSnapshot::Ewma(_) => MetricKind::Ewma,
            MetricSnapshot::Meter(_) => MetricKind::Meter,
        }
    }

    /// Named values describing this snapshot, in a stable order
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        match self {
            MetricSnapshot::Counter(c) => vec![("count", FieldValue::Int(c.count()))],
            MetricSnapshot::Gauge(g) => vec![("value", FieldValue::Int(g.value()))],
            MetricSnapshot::GaugeFloat64(g) => vec![("value", FieldValue::Float(g.value()))],
            MetricSnapshot::Ewma(e) => vec![("rate", FieldValue::Float(e.rate()))],
            MetricSnapshot::Meter(m) => vec![
                ("count", FieldValue::Int(m.count)),
                ("1m.rate", FieldValue::Float(m.rate1)),
                ("5m.rate", FieldValue::Float(m.rate5)),
                ("15m.rate", FieldValue::Float(m.rate15)),
                ("mean.rate", FieldValue::Float(m.rate_mean)),
            ],
        }
    }
}
