//! Collector helper
//!
//! [`CollectorBase`] is what a stat source embeds: it owns the source's
//! prefixed child registry, its error ledger and a handle to the shared delta
//! tracker, and exposes short update calls that never fail the pass.

use std::sync::Arc;

use tracing::trace;

use super::errors::{ErrorLedger, ErrorRecord};
use crate::context::MetricsContext;
use crate::error::Result;
use crate::metrics::{
    get_or_register_counter, get_or_register_ewma, get_or_register_gauge,
    get_or_register_gauge_float64, get_or_register_meter, DeltaTracker, PrefixedRegistry,
    Registry,
};

const KIND_MISMATCH: &str = "metric_kind_mismatch";

/// Registry, delta tracker and error ledger of one collector
pub struct CollectorBase {
    prefix: String,
    registry: Arc<dyn Registry>,
    deltas: Arc<DeltaTracker>,
    errors: ErrorLedger,
}

impl CollectorBase {
    /// Base for a collector registering under `prefix` in the context registry
    pub fn new(prefix: impl Into<String>, ctx: &MetricsContext) -> Self {
        let prefix: String = prefix.into();
        let registry = PrefixedRegistry::shared(Arc::clone(ctx.registry()), prefix.clone());
        let errors = ErrorLedger::new(prefix.clone(), Arc::clone(&registry));

        Self {
            prefix,
            registry,
            deltas: Arc::clone(ctx.deltas()),
            errors,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The collector's child registry
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn errors(&self) -> &ErrorLedger {
        &self.errors
    }

    // =========================================================================
    // Updates
    // =========================================================================

    pub fn gauge_update(&self, name: &str, value: i64) {
        let gauge = get_or_register_gauge(self.registry.as_ref(), name);
        if let Some(gauge) = self.ok_or_record(gauge) {
            gauge.update(value);
        }
    }

    pub fn gauge_float64_update(&self, name: &str, value: f64) {
        let gauge = get_or_register_gauge_float64(self.registry.as_ref(), name);
        if let Some(gauge) = self.ok_or_record(gauge) {
            gauge.update(value);
        }
    }

    pub fn counter_inc(&self, name: &str, delta: i64) {
        let counter = get_or_register_counter(self.registry.as_ref(), name);
        if let Some(counter) = self.ok_or_record(counter) {
            counter.inc(delta);
        }
    }

    /// Feed an absolute reading of a cumulative source counter.
    ///
    /// The counter is created on the first reading but only advances from the
    /// second one on, by the increment since the previous reading.
    pub fn counter_inc_total(&self, name: &str, absolute: i64) {
        let counter = get_or_register_counter(self.registry.as_ref(), name);
        let Some(counter) = self.ok_or_record(counter) else {
            return;
        };

        let key = self.registry.qualify(name);
        match self.deltas.observe_cumulative(&key, absolute) {
            Some(delta) => counter.inc(delta),
            None => trace!(key = %key, "First reading, no baseline yet"),
        }
    }

    pub fn ewma_update(&self, name: &str, n: i64) {
        let ewma = get_or_register_ewma(self.registry.as_ref(), name);
        if let Some(ewma) = self.ok_or_record(ewma) {
            ewma.update(n);
        }
    }

    pub fn meter_mark(&self, name: &str, n: i64) {
        let meter = get_or_register_meter(self.registry.as_ref(), name);
        if let Some(meter) = self.ok_or_record(meter) {
            meter.mark(n);
        }
    }

    // =========================================================================
    // Failures
    // =========================================================================

    /// Record a failed sample under the category `key`
    pub fn on_err(&self, key: &str, err: impl Into<anyhow::Error>) {
        self.errors.record(key, &err.into());
    }

    /// Ledger entry for `key`
    pub fn last_error(&self, key: &str) -> Option<ErrorRecord> {
        self.errors.get(key)
    }

    fn ok_or_record<T>(&self, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.on_err(KIND_MISMATCH, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for CollectorBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorBase")
            .field("prefix", &self.prefix)
            .field("errors", &self.errors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricSnapshot;
    use anyhow::anyhow;
    use assert_matches::assert_matches;

    fn snapshot(ctx: &MetricsContext, name: &str) -> MetricSnapshot {
        ctx.registry().get(name).unwrap().snapshot()
    }

    #[test]
    fn test_updates_land_under_prefix() {
        let ctx = MetricsContext::standalone();
        let base = CollectorBase::new("system", &ctx);

        base.gauge_update("load1", 3);
        base.gauge_float64_update("mem.free", 12.5);
        base.counter_inc("ticks", 2);

        assert_matches!(snapshot(&ctx, "system.load1"), MetricSnapshot::Gauge(g) if g.value() == 3);
        assert_matches!(
            snapshot(&ctx, "system.mem.free"),
            MetricSnapshot::GaugeFloat64(g) if g.value() == 12.5
        );
        assert_matches!(snapshot(&ctx, "system.ticks"), MetricSnapshot::Counter(c) if c.count() == 2);
    }

    #[test]
    fn test_counter_inc_total_skips_first_reading() {
        let ctx = MetricsContext::standalone();
        let base = CollectorBase::new("nginx", &ctx);

        base.counter_inc_total("requests", 1000);
        assert_matches!(snapshot(&ctx, "nginx.requests"), MetricSnapshot::Counter(c) if c.count() == 0);

        base.counter_inc_total("requests", 1040);
        base.counter_inc_total("requests", 1100);
        assert_matches!(snapshot(&ctx, "nginx.requests"), MetricSnapshot::Counter(c) if c.count() == 100);

        assert_eq!(ctx.deltas().last("nginx.requests"), Some(1100));
    }

    #[test]
    fn test_delta_keys_are_fully_qualified() {
        let ctx = MetricsContext::standalone().scoped("group.sign");
        let a = CollectorBase::new("a", &ctx);
        let b = CollectorBase::new("b", &ctx);

        a.counter_inc_total("x", 10);
        b.counter_inc_total("x", 500);

        assert_eq!(ctx.deltas().last("group.sign.a.x"), Some(10));
        assert_eq!(ctx.deltas().last("group.sign.b.x"), Some(500));
    }

    #[test]
    fn test_on_err_feeds_error_gauge() {
        let ctx = MetricsContext::standalone();
        let base = CollectorBase::new("nginx", &ctx);

        for i in 0..3 {
            base.on_err("parse", anyhow!("bad line {}", i));
        }

        assert_matches!(snapshot(&ctx, "nginx.error.parse"), MetricSnapshot::Gauge(g) if g.value() == 3);
        assert_eq!(base.last_error("parse").unwrap().last_error, "bad line 2");
    }

    #[test]
    fn test_kind_mismatch_is_recorded() {
        let ctx = MetricsContext::standalone();
        let base = CollectorBase::new("proc", &ctx);

        base.counter_inc("nginx", 1);
        base.gauge_update("nginx", 4);

        assert_eq!(base.last_error(KIND_MISMATCH).unwrap().count, 1);
        assert_matches!(snapshot(&ctx, "proc.nginx"), MetricSnapshot::Counter(c) if c.count() == 1);
    }
}
