//! Metric Registry
//!
//! Maps dot-segmented names to [`Metric`] instances. [`StandardRegistry`] owns
//! the storage; [`PrefixedRegistry`] is a storage-less view that rewrites
//! every name to `prefix.name` before forwarding to its parent, so children
//! can be nested to build hierarchical namespaces over one shared store.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::naming;
use super::{Counter, Ewma, Gauge, GaugeFloat64, Meter, Metric, MetricKind};
use crate::error::{Error, Result};

// =============================================================================
// Registry Trait
// =============================================================================

/// Name-to-metric store
pub trait Registry: Send + Sync {
    /// Look up a metric by name
    fn get(&self, name: &str) -> Option<Metric>;

    /// Insert a metric; fails if the name is taken
    fn register(&self, name: &str, metric: Metric) -> Result<()>;

    /// Return the metric under `name`, creating it with `factory` if absent.
    ///
    /// The check and the insert happen under one critical section, so
    /// concurrent callers always receive the same instance.
    fn get_or_register(&self, name: &str, factory: &dyn Fn() -> Metric) -> Metric;

    /// Remove a metric
    fn unregister(&self, name: &str) -> Option<Metric>;

    /// Visit every (name, metric) pair.
    ///
    /// Visits a copy of the entries taken at call time, so `visit` may call
    /// back into the registry. Order is unspecified.
    fn each(&self, visit: &mut dyn FnMut(&str, &Metric));

    /// Number of metrics visible through this registry
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fully-qualified name of `name` in the backing store
    fn qualify(&self, name: &str) -> String {
        name.to_string()
    }
}

// =============================================================================
// Standard Registry
// =============================================================================

/// Registry that owns its storage
#[derive(Default)]
pub struct StandardRegistry {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl StandardRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry behind an `Arc<dyn Registry>`
    pub fn shared() -> Arc<dyn Registry> {
        Arc::new(Self::new())
    }
}

impl Registry for StandardRegistry {
    fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.read().get(name).cloned()
    }

    fn register(&self, name: &str, metric: Metric) -> Result<()> {
        let mut metrics = self.metrics.write();
        if metrics.contains_key(name) {
            return Err(Error::DuplicateMetric {
                name: name.to_string(),
            });
        }
        metrics.insert(name.to_string(), metric);
        Ok(())
    }

    fn get_or_register(&self, name: &str, factory: &dyn Fn() -> Metric) -> Metric {
        let metrics = self.metrics.read();
        if let Some(metric) = metrics.get(name) {
            return metric.clone();
        }
        drop(metrics);

        let mut metrics = self.metrics.write();
        metrics
            .entry(name.to_string())
            .or_insert_with(factory)
            .clone()
    }

    fn unregister(&self, name: &str) -> Option<Metric> {
        self.metrics.write().remove(name)
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Metric)) {
        let entries: Vec<(String, Metric)> = self
            .metrics
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (name, metric) in &entries {
            visit(name, metric);
        }
    }

    fn len(&self) -> usize {
        self.metrics.read().len()
    }
}

// =============================================================================
// Prefixed Registry
// =============================================================================

/// Child view over a parent registry that prefixes every name
#[derive(Clone)]
pub struct PrefixedRegistry {
    parent: Arc<dyn Registry>,
    prefix: String,
}

impl PrefixedRegistry {
    /// Create a child of `parent` under `prefix`
    pub fn new(parent: Arc<dyn Registry>, prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            parent,
            prefix: prefix.trim_end_matches('.').to_string(),
        }
    }

    /// Create a child behind an `Arc<dyn Registry>`
    pub fn shared(parent: Arc<dyn Registry>, prefix: impl Into<String>) -> Arc<dyn Registry> {
        Arc::new(Self::new(parent, prefix))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn local_name(&self, name: &str) -> String {
        naming::join(&self.prefix, name)
    }

    /// Fully-qualified prefix of this child in the backing store
    fn scope(&self) -> String {
        if self.prefix.is_empty() {
            return String::new();
        }
        let scope = self.parent.qualify(&self.prefix);
        format!("{}.", scope)
    }
}

impl Registry for PrefixedRegistry {
    fn get(&self, name: &str) -> Option<Metric> {
        self.parent.get(&self.local_name(name))
    }

    fn register(&self, name: &str, metric: Metric) -> Result<()> {
        self.parent.register(&self.local_name(name), metric)
    }

    fn get_or_register(&self, name: &str, factory: &dyn Fn() -> Metric) -> Metric {
        self.parent.get_or_register(&self.local_name(name), factory)
    }

    fn unregister(&self, name: &str) -> Option<Metric> {
        self.parent.unregister(&self.local_name(name))
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Metric)) {
        let scope = self.scope();
        self.parent.each(&mut |name, metric| {
            if name.starts_with(&scope) {
                visit(name, metric);
            }
        });
    }

    fn len(&self) -> usize {
        let mut count = 0;
        self.each(&mut |_, _| count += 1);
        count
    }

    fn qualify(&self, name: &str) -> String {
        self.parent.qualify(&self.local_name(name))
    }
}

// =============================================================================
// Process-wide Default
// =============================================================================

static GLOBAL_REGISTRY: Lazy<RwLock<Arc<dyn Registry>>> =
    Lazy::new(|| RwLock::new(StandardRegistry::shared()));

/// The process-wide default registry
pub fn global_registry() -> Arc<dyn Registry> {
    Arc::clone(&GLOBAL_REGISTRY.read())
}

/// Replace the process-wide default registry.
///
/// Only allowed while the current one is empty, so no metric handed out
/// earlier silently stops being reported.
pub fn set_global_registry(registry: Arc<dyn Registry>) -> Result<()> {
    let mut global = GLOBAL_REGISTRY.write();
    let len = global.len();
    if len > 0 {
        return Err(Error::GlobalRegistryNotEmpty { len });
    }
    *global = registry;
    Ok(())
}

// =============================================================================
// Typed Helpers
// =============================================================================

fn mismatch(name: &str, expected: MetricKind, actual: &Metric) -> Error {
    Error::MetricKindMismatch {
        name: name.to_string(),
        expected,
        actual: actual.kind(),
    }
}

/// Existing counter under `name`, or a newly registered one
pub fn get_or_register_counter(registry: &dyn Registry, name: &str) -> Result<Arc<Counter>> {
    match registry.get_or_register(name, &Metric::counter) {
        Metric::Counter(c) => Ok(c),
        other => Err(mismatch(name, MetricKind::Counter, &other)),
    }
}

/// Existing gauge under `name`, or a newly registered one
pub fn get_or_register_gauge(registry: &dyn Registry, name: &str) -> Result<Arc<Gauge>> {
    match registry.get_or_register(name, &Metric::gauge) {
        Metric::Gauge(g) => Ok(g),
        other => Err(mismatch(name, MetricKind::Gauge, &other)),
    }
}

/// Existing float gauge under `name`, or a newly registered one
pub fn get_or_register_gauge_float64(
    registry: &dyn Registry,
    name: &str,
) -> Result<Arc<GaugeFloat64>> {
    match registry.get_or_register(name, &Metric::gauge_float64) {
        Metric::GaugeFloat64(g) => Ok(g),
        other => Err(mismatch(name, MetricKind::GaugeFloat64, &other)),
    }
}

/// Existing EWMA under `name`, or a newly registered one-minute EWMA
pub fn get_or_register_ewma(registry: &dyn Registry, name: &str) -> Result<Arc<Ewma>> {
    match registry.get_or_register(name, &Metric::ewma) {
        Metric::Ewma(e) => Ok(e),
        other => Err(mismatch(name, MetricKind::Ewma, &other)),
    }
}

/// Existing meter under `name`, or a newly registered one
pub fn get_or_register_meter(registry: &dyn Registry, name: &str) -> Result<Arc<Meter>> {
    match registry.get_or_register(name, &Metric::meter) {
        Metric::Meter(m) => Ok(m),
        other => Err(mismatch(name, MetricKind::Meter, &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(registry: &dyn Registry) -> Vec<String> {
        let mut out = Vec::new();
        registry.each(&mut |name, _| out.push(name.to_string()));
        out.sort();
        out
    }

    // =========================================================================
    // StandardRegistry Tests
    // =========================================================================

    #[test]
    fn test_register_and_get() {
        let registry = StandardRegistry::new();
        registry.register("uptime", Metric::gauge()).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("uptime").unwrap().kind(), MetricKind::Gauge);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_register_duplicate_fails() {
        let registry = StandardRegistry::new();
        let first = Metric::gauge();
        registry.register("load1", first.clone()).unwrap();

        let result = registry.register("load1", Metric::counter());
        assert_matches!(result, Err(Error::DuplicateMetric { name }) if name == "load1");

        // Original stays in place
        assert!(registry.get("load1").unwrap().same_instance(&first));
    }

    #[test]
    fn test_get_or_register_returns_existing() {
        let registry = StandardRegistry::new();
        let a = registry.get_or_register("x", &Metric::counter);
        let b = registry.get_or_register("x", &Metric::gauge);

        assert!(a.same_instance(&b));
        assert_eq!(b.kind(), MetricKind::Counter);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = StandardRegistry::new();
        registry.register("x", Metric::gauge()).unwrap();
        assert!(registry.unregister("x").is_some());
        assert!(registry.unregister("x").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_each_allows_reentry() {
        let registry = StandardRegistry::new();
        registry.register("a", Metric::gauge()).unwrap();
        registry.register("b", Metric::gauge()).unwrap();

        let mut visited = 0;
        registry.each(&mut |name, _| {
            visited += 1;
            // Registering from inside the visitor must not deadlock
            registry.get_or_register(&format!("{}.copy", name), &Metric::gauge);
        });

        assert_eq!(visited, 2);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_concurrent_get_or_register_single_instance() {
        let registry = Arc::new(StandardRegistry::new());
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let created = Arc::clone(&created);
                std::thread::spawn(move || {
                    registry.get_or_register("shared", &|| {
                        created.fetch_add(1, Ordering::SeqCst);
                        Metric::counter()
                    })
                })
            })
            .collect();

        let metrics: Vec<Metric> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(metrics.iter().all(|m| m.same_instance(&metrics[0])));
    }

    // =========================================================================
    // PrefixedRegistry Tests
    // =========================================================================

    #[test]
    fn test_prefixed_register_visible_in_parent() {
        let parent = StandardRegistry::shared();
        let child = PrefixedRegistry::new(Arc::clone(&parent), "system");

        let gauge = Metric::gauge();
        child.register("load1", gauge.clone()).unwrap();

        assert!(parent.get("system.load1").unwrap().same_instance(&gauge));
        assert!(child.get("load1").unwrap().same_instance(&gauge));
    }

    #[test]
    fn test_prefixed_trailing_dot() {
        let parent = StandardRegistry::shared();
        let child = PrefixedRegistry::new(Arc::clone(&parent), "group.sign.");
        child.get_or_register("uptime", &Metric::gauge);

        assert!(parent.get("group.sign.uptime").is_some());
        assert_eq!(child.prefix(), "group.sign");
    }

    #[test]
    fn test_nested_prefixes() {
        let root = StandardRegistry::shared();
        let host = PrefixedRegistry::shared(Arc::clone(&root), "group.sign");
        let system = PrefixedRegistry::new(Arc::clone(&host), "system");

        system.get_or_register("mem.free", &Metric::gauge_float64);

        assert!(root.get("group.sign.system.mem.free").is_some());
        assert_eq!(system.qualify("x"), "group.sign.system.x");
        assert_eq!(host.qualify("x"), "group.sign.x");
    }

    #[test]
    fn test_prefixed_each_and_len_scoped() {
        let root = StandardRegistry::shared();
        let system = PrefixedRegistry::new(Arc::clone(&root), "system");
        let nginx = PrefixedRegistry::new(Arc::clone(&root), "nginx");

        system.get_or_register("load1", &Metric::gauge);
        system.get_or_register("load5", &Metric::gauge);
        nginx.get_or_register("active", &Metric::gauge);
        root.get_or_register("systemd", &Metric::gauge);

        assert_eq!(root.len(), 4);
        assert_eq!(system.len(), 2);
        assert_eq!(nginx.len(), 1);
        assert_eq!(names(&system), vec!["system.load1", "system.load5"]);
    }

    #[test]
    fn test_prefixed_duplicate_fails() {
        let root = StandardRegistry::shared();
        let child = PrefixedRegistry::new(Arc::clone(&root), "proc");
        child.register("nginx", Metric::gauge()).unwrap();

        assert_matches!(
            root.register("proc.nginx", Metric::gauge()),
            Err(Error::DuplicateMetric { .. })
        );
    }

    #[test]
    fn test_global_registry_swap_requires_empty() {
        let replacement = StandardRegistry::shared();
        set_global_registry(Arc::clone(&replacement)).unwrap();
        assert!(Arc::ptr_eq(&global_registry(), &replacement));

        global_registry().register("held", Metric::gauge()).unwrap();
        assert_matches!(
            set_global_registry(StandardRegistry::shared()),
            Err(Error::GlobalRegistryNotEmpty { len: 1 })
        );

        global_registry().unregister("held");
    }

    // =========================================================================
    // Typed Helper Tests
    // =========================================================================

    #[test]
    fn test_typed_helpers() {
        let registry = StandardRegistry::new();
        let gauge = get_or_register_gauge(&registry, "g").unwrap();
        gauge.update(5);
        assert_eq!(get_or_register_gauge(&registry, "g").unwrap().value(), 5);

        get_or_register_counter(&registry, "c").unwrap().inc(2);
        get_or_register_gauge_float64(&registry, "f").unwrap().update(0.5);
        get_or_register_ewma(&registry, "e").unwrap().update(1);
        get_or_register_meter(&registry, "m").unwrap().mark(1);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_typed_helper_kind_mismatch() {
        let registry = StandardRegistry::new();
        get_or_register_counter(&registry, "requests").unwrap();

        let result = get_or_register_gauge(&registry, "requests");
        assert_matches!(
            result,
            Err(Error::MetricKindMismatch {
                expected: MetricKind::Gauge,
                actual: MetricKind::Counter,
                ..
            })
        );
    }
}
