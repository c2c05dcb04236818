//! hostpulse - Host Metrics Collection Agent
//!
//! Periodically samples operating-system counters (CPU, memory, disk,
//! network, processes, nginx) and keeps them as named, typed metrics ready to
//! be pushed to a remote aggregator.
//!
//! # Architecture
//!
//! ```text
//! CollectorManager (tick) → Collector (sample) → Registry (store) → report
//! ```
//!
//! # Modules
//!
//! - [`metrics`] - Metric primitives, registry, naming and delta tracking
//! - [`context`] - Shared registry and delta state handed to components
//! - [`collector`] - Collector trait, collector helper and scheduler
//! - [`sources`] - System, process and nginx collectors
//! - [`report`] - Data points, text/JSON dumps and the log reporter
//! - [`config`] - TOML agent configuration
//! - [`shutdown`] - CTRL+C / SIGTERM handling
//! - [`error`] - Error types

pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod report;
pub mod shutdown;
pub mod sources;

// Re-export commonly used types
pub use collector::{Collector, CollectorBase, CollectorManager, ManagerConfig, ShutdownHandle};
pub use config::AgentConfig;
pub use context::{default_context, MetricsContext};
pub use error::{Error, Result};
pub use metrics::{
    Counter, DeltaTracker, Ewma, Gauge, GaugeFloat64, Meter, Metric, MetricKind, MetricSnapshot,
    PrefixedRegistry, Registry, StandardRegistry,
};
pub use report::LogReporter;

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
