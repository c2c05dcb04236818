//! Error types for the host metrics agent

use thiserror::Error;

use crate::metrics::MetricKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the host metrics agent
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// A metric is already registered under this name
    #[error("Duplicate metric: {name}")]
    DuplicateMetric { name: String },

    /// The name is taken by a metric of another kind
    #[error("Metric {name} is a {actual}, expected a {expected}")]
    MetricKindMismatch {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    /// The process-wide registry still holds metrics
    #[error("Global registry is not empty ({len} metrics registered)")]
    GlobalRegistryNotEmpty { len: usize },

    // =========================================================================
    // Scheduler Errors
    // =========================================================================
    /// Collector manager lifecycle misuse
    #[error("Collector manager cannot {action} while {state}")]
    ManagerState {
        action: &'static str,
        state: &'static str,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // =========================================================================
    // Source Errors
    // =========================================================================
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed nginx stub_status page
    #[error("Invalid nginx status page: {0}")]
    NginxStatus(String),

    /// Unreadable or malformed procfs file
    #[error("Invalid {file}: {reason}")]
    Procfs { file: String, reason: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
