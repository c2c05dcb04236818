//! Agent Configuration
//!
//! TOML file describing the host identity, collection timing and which
//! sources to run. Every field has a default, so an empty file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::sources::{NginxConfig, ProcessConfig, SystemConfig};

/// Locations searched when no path is given, in order
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["/etc/hostpulse/agent.toml", "./conf/agent.toml"];

const DEFAULT_HOST_GROUP: &str = "group";
const DEFAULT_HOST_SIGN: &str = "sign";

// =============================================================================
// Sections
// =============================================================================

/// Top-level agent configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Force debug logging
    pub debug: bool,

    pub agent_name: String,

    /// Seconds between collection passes
    pub collect_seconds: u64,

    pub host: HostConfig,
    pub logging: LoggingConfig,
    pub report: ReportConfig,
    pub collector: CollectorsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            debug: false,
            agent_name: "hostpulse-agent".to_string(),
            collect_seconds: 1,
            host: HostConfig::default(),
            logging: LoggingConfig::default(),
            report: ReportConfig::default(),
            collector: CollectorsConfig::default(),
        }
    }
}

/// `[host]` section
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub host_group: String,
    pub host_sign: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host_group: DEFAULT_HOST_GROUP.to_string(),
            host_sign: DEFAULT_HOST_SIGN.to_string(),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// `[report]` section
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub enable: bool,
    pub interval_seconds: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enable: true,
            interval_seconds: 10,
        }
    }
}

/// `[collector.*]` sections
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectorsConfig {
    pub system: SystemConfig,
    pub proc: ProcessConfig,
    pub nginx: NginxConfig,
}

// =============================================================================
// Loading
// =============================================================================

impl AgentConfig {
    /// Parse a TOML document, fill blank fields and validate
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Load from `path`, or from the first existing default location
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let found = find_default(DEFAULT_CONFIG_PATHS).ok_or_else(|| {
                    Error::Config(format!(
                        "No configuration file found in {:?}",
                        DEFAULT_CONFIG_PATHS
                    ))
                })?;
                Self::load(found)
            }
        }
    }

    /// Blank identity fields fall back to their defaults
    fn apply_defaults(&mut self) {
        if self.host.host_group.trim().is_empty() {
            self.host.host_group = DEFAULT_HOST_GROUP.to_string();
        }
        if self.host.host_sign.trim().is_empty() {
            self.host.host_sign = DEFAULT_HOST_SIGN.to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.collect_seconds == 0 {
            return Err(Error::Config("collect_seconds must be at least 1".into()));
        }
        if self.report.enable && self.report.interval_seconds == 0 {
            return Err(Error::Config(
                "report.interval_seconds must be at least 1".into(),
            ));
        }
        if self.collector.nginx.enable && self.collector.nginx.url.trim().is_empty() {
            return Err(Error::Config("collector.nginx.url is empty".into()));
        }
        Ok(())
    }

    /// Prefix every agent metric is registered under
    pub fn registry_prefix(&self) -> String {
        format!("{}.{}", self.host.host_group, self.host.host_sign)
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_seconds)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report.interval_seconds)
    }

    /// Effective log level; `debug = true` wins
    pub fn log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.logging.log_level
        }
    }
}

/// First path in `candidates` that exists
pub fn find_default(candidates: &[&str]) -> Option<PathBuf> {
    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.is_file() {
            return Some(path);
        }
        debug!(path = *candidate, "No configuration file");
    }
    None
}
