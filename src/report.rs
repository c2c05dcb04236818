//! Registry Reporting
//!
//! Read-only views over a registry for whatever ships the metrics out:
//! flat data points in `key value timestamp` form, a sorted text dump, a JSON
//! document, and a periodic reporter that logs every metric.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::metrics::{FieldValue, MetricKind, MetricSnapshot, Registry};

// =============================================================================
// Data Points
// =============================================================================

/// One numeric sample ready for a line-oriented transport
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub key: String,
    pub value: FieldValue,
    /// Unix seconds
    pub timestamp: i64,
}

impl DataPoint {
    pub fn new(key: impl Into<String>, value: FieldValue, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
        }
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} {}", self.key, self.value, self.timestamp)
    }
}

/// Snapshot every metric of `registry`, sorted by name
fn sorted_snapshots(registry: &dyn Registry) -> Vec<(String, MetricSnapshot)> {
    let mut out = Vec::with_capacity(registry.len());
    registry.each(&mut |name, metric| out.push((name.to_string(), metric.snapshot())));
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

/// Flatten `registry` into data points stamped with `timestamp`.
///
/// Single-value metrics use their name as key; multi-value metrics get one
/// point per field under `name.field`.
pub fn data_points(registry: &dyn Registry, timestamp: i64) -> Vec<DataPoint> {
    let mut points = Vec::new();
    for (name, snapshot) in sorted_snapshots(registry) {
        let fields = snapshot.fields();
        if let [(_, value)] = fields.as_slice() {
            points.push(DataPoint::new(name, *value, timestamp));
            continue;
        }
        for (field, value) in fields {
            points.push(DataPoint::new(format!("{}.{}", name, field), value, timestamp));
        }
    }
    points
}

/// Data points stamped with the current time
pub fn data_points_now(registry: &dyn Registry) -> Vec<DataPoint> {
    data_points(registry, Utc::now().timestamp())
}

// =============================================================================
// Text and JSON
// =============================================================================

fn kind_label(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Counter => "counter",
        MetricKind::Gauge | MetricKind::GaugeFloat64 => "gauge",
        MetricKind::Ewma => "ewma",
        MetricKind::Meter => "meter",
    }
}

fn describe(name: &str, snapshot: &MetricSnapshot) -> String {
    let mut line = format!("{} {}:", kind_label(snapshot.kind()), name);
    for (field, value) in snapshot.fields() {
        line.push_str(&format!(" {}: {}", field, value));
    }
    line
}

/// Write one line per metric, sorted by name
pub fn write_sorted<W: Write>(registry: &dyn Registry, writer: &mut W) -> Result<()> {
    for (name, snapshot) in sorted_snapshots(registry) {
        writeln!(writer, "{}", describe(&name, &snapshot))?;
    }
    Ok(())
}

/// `{ name: { field: value } }` document of the whole registry
pub fn to_json_value(registry: &dyn Registry) -> Value {
    let mut doc: BTreeMap<String, BTreeMap<&'static str, Value>> = BTreeMap::new();
    for (name, snapshot) in sorted_snapshots(registry) {
        let fields = snapshot
            .fields()
            .into_iter()
            .map(|(field, value)| (field, Value::from(value)))
            .collect();
        doc.insert(name, fields);
    }
    serde_json::json!(doc)
}

/// Serialized form of [`to_json_value`]
pub fn to_json(registry: &dyn Registry) -> Result<String> {
    Ok(serde_json::to_string(&to_json_value(registry))?)
}

// =============================================================================
// Log Reporter
// =============================================================================

/// Periodically logs every metric of a registry
pub struct LogReporter {
    registry: Arc<dyn Registry>,
    interval: Duration,
}

impl LogReporter {
    pub fn new(registry: Arc<dyn Registry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Log every metric once
    pub fn report(&self) -> usize {
        let snapshots = sorted_snapshots(self.registry.as_ref());
        for (name, snapshot) in &snapshots {
            info!(target: "hostpulse::report", "{}", describe(name, snapshot));
        }
        snapshots.len()
    }

    /// Report on every interval until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?self.interval, "Starting log reporter");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Log reporter stopped");
                    return;
                }
                _ = tick.tick() => {
                    let count = self.report();
                    debug!(metrics = count, "Reported metrics");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{
        get_or_register_counter, get_or_register_gauge, get_or_register_gauge_float64,
        get_or_register_meter, StandardRegistry,
    };

    fn sample_registry() -> Arc<dyn Registry> {
        let registry = StandardRegistry::shared();
        get_or_register_gauge(registry.as_ref(), "system.load1")
            .unwrap()
            .update(2);
        get_or_register_gauge_float64(registry.as_ref(), "system.mem.free")
            .unwrap()
            .update(512.25);
        get_or_register_counter(registry.as_ref(), "nginx.requests")
            .unwrap()
            .inc(40);
        registry
    }

    #[test]
    fn test_data_point_display() {
        let point = DataPoint::new("system.load1", FieldValue::Int(3), 1_700_000_000);
        assert_eq!(point.to_string(), "system.load1 3 1700000000\n");

        let point = DataPoint::new("system.mem.free", FieldValue::Float(1.5), 10);
        assert_eq!(point.to_string(), "system.mem.free 1.500000 10\n");
    }

    #[test]
    fn test_data_points_sorted() {
        let registry = sample_registry();
        let keys: Vec<_> = data_points(registry.as_ref(), 1)
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(
            keys,
            vec!["nginx.requests", "system.load1", "system.mem.free"]
        );
    }

    #[test]
    fn test_data_points_expand_meter() {
        let registry = StandardRegistry::shared();
        get_or_register_meter(registry.as_ref(), "events").unwrap().mark(3);

        let points = data_points(registry.as_ref(), 5);
        assert_eq!(points.len(), 5);
        assert_eq!(points[0].key, "events.count");
        assert_eq!(points[0].value, FieldValue::Int(3));
        assert!(points.iter().all(|p| p.timestamp == 5));
    }

    #[test]
    fn test_write_sorted() {
        let registry = sample_registry();
        let mut out = Vec::new();
        write_sorted(registry.as_ref(), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "counter nginx.requests: count: 40\n\
             gauge system.load1: value: 2\n\
             gauge system.mem.free: value: 512.250000\n"
        );
    }

    #[test]
    fn test_to_json() {
        let registry = sample_registry();
        let doc: Value = serde_json::from_str(&to_json(registry.as_ref()).unwrap()).unwrap();

        assert_eq!(doc["nginx.requests"]["count"], 40);
        assert_eq!(doc["system.load1"]["value"], 2);
        assert_eq!(doc["system.mem.free"]["value"], 512.25);
    }

    #[test]
    fn test_report_counts_metrics() {
        let reporter = LogReporter::new(sample_registry(), Duration::from_secs(10));
        assert_eq!(reporter.report(), 3);
    }

    #[tokio::test]
    async fn test_reporter_stops_on_cancel() {
        let reporter = LogReporter::new(sample_registry(), Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reporter.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        task.await.unwrap();
    }
}
