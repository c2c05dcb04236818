//! Per-collector failure ledger
//!
//! A failed sample is not fatal: the collector records it here and returns
//! early from its pass. Every record also bumps the gauge `error.<key>` in
//! the collector's registry, so failures are reported like any other metric.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::metrics::{get_or_register_gauge, naming, Registry};

/// Last failure and occurrence count of one error category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub last_error: String,
    pub count: u64,
}

/// Error category to [`ErrorRecord`] map backed by error gauges
pub struct ErrorLedger {
    prefix: String,
    registry: Arc<dyn Registry>,
    records: DashMap<String, ErrorRecord>,
}

impl ErrorLedger {
    /// Ledger writing its gauges into `registry`
    pub fn new(prefix: impl Into<String>, registry: Arc<dyn Registry>) -> Self {
        Self {
            prefix: prefix.into(),
            registry,
            records: DashMap::new(),
        }
    }

    /// Record one failure under `key`
    pub fn record(&self, key: &str, err: &anyhow::Error) {
        let message = err.to_string();

        let count = {
            let mut entry = self
                .records
                .entry(key.to_string())
                .or_insert_with(|| ErrorRecord {
                    last_error: String::new(),
                    count: 0,
                });
            entry.count += 1;
            entry.last_error = message.clone();
            entry.count
        };

        let gauge_name = naming::join("error", key);
        match get_or_register_gauge(self.registry.as_ref(), &gauge_name) {
            Ok(gauge) => gauge.inc(1),
            Err(e) => warn!(prefix = %self.prefix, error = %e, "Error gauge unavailable"),
        }

        warn!(
            prefix = %self.prefix,
            key = key,
            count = count,
            error = %format!("{:#}", err),
            "Collection failed"
        );
    }

    /// Record for `key`, if any failure was seen
    pub fn get(&self, key: &str) -> Option<ErrorRecord> {
        self.records.get(key).map(|r| r.clone())
    }

    /// Total failures across all categories
    pub fn total(&self) -> u64 {
        self.records.iter().map(|r| r.count).sum()
    }

    /// All records, sorted by key
    pub fn records(&self) -> Vec<(String, ErrorRecord)> {
        let mut out: Vec<_> = self
            .records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl std::fmt::Debug for ErrorLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorLedger")
            .field("prefix", &self.prefix)
            .field("categories", &self.records.len())
            .finish()
    }
}
