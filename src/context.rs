//! Metrics Context
//!
//! Bundles the state every collector shares: the base registry metrics are
//! stored in and the delta tracker for cumulative counters. Components receive
//! a context at construction instead of reaching for process globals.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::metrics::{global_registry, DeltaTracker, PrefixedRegistry, Registry, StandardRegistry};

/// Shared registry and delta state
#[derive(Clone)]
pub struct MetricsContext {
    registry: Arc<dyn Registry>,
    deltas: Arc<DeltaTracker>,
}

impl MetricsContext {
    /// Context over an explicit registry with a fresh delta tracker
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            deltas: Arc::new(DeltaTracker::new()),
        }
    }

    /// Context with its own empty registry
    pub fn standalone() -> Self {
        Self::new(StandardRegistry::shared())
    }

    /// Context sharing an existing delta tracker
    pub fn with_deltas(registry: Arc<dyn Registry>, deltas: Arc<DeltaTracker>) -> Self {
        Self { registry, deltas }
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn deltas(&self) -> &Arc<DeltaTracker> {
        &self.deltas
    }

    /// Context whose registry is a child of this one under `prefix`.
    ///
    /// The delta tracker is shared, so keys stay unique as long as they are
    /// fully qualified.
    pub fn scoped(&self, prefix: &str) -> Self {
        Self {
            registry: PrefixedRegistry::shared(Arc::clone(&self.registry), prefix),
            deltas: Arc::clone(&self.deltas),
        }
    }
}

impl std::fmt::Debug for MetricsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsContext")
            .field("metrics", &self.registry.len())
            .field("delta_keys", &self.deltas.len())
            .finish()
    }
}

static DEFAULT_CONTEXT: Lazy<MetricsContext> =
    Lazy::new(|| MetricsContext::new(global_registry()));

/// Process-wide convenience context over the global registry.
///
/// Created on first use; a registry installed with
/// [`set_global_registry`](crate::metrics::set_global_registry) after that is
/// not picked up.
pub fn default_context() -> MetricsContext {
    DEFAULT_CONTEXT.clone()
}
