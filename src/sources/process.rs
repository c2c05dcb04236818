//! Process Collector
//!
//! Counts running processes per configured pattern. Each pattern gets a
//! gauge `proc.<pattern>` holding the number of processes whose command line
//! contains it, the way `ps -ef | grep <pattern>` would see them.
//!
//! The process table scan blocks, so it runs on the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use sysinfo::{Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::collector::{Collector, CollectorBase};
use crate::context::MetricsContext;

pub const PREFIX: &str = "proc";

/// `[collector.proc]` section
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessConfig {
    pub enable: bool,

    /// Comma separated name patterns, e.g. `"nginx, redis"`
    pub process_names: String,
}

impl ProcessConfig {
    /// Trimmed, non-empty, de-duplicated patterns
    pub fn patterns(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in self.process_names.split(',').map(str::trim) {
            if !name.is_empty() && !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
        out
    }
}

/// Text a pattern is matched against: the full command line, falling back to
/// the executable path and then the (possibly truncated) process name
fn match_text(process: &Process) -> String {
    let cmd = process
        .cmd()
        .iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    if !cmd.trim().is_empty() {
        return cmd;
    }
    match process.exe() {
        Some(exe) => exe.to_string_lossy().into_owned(),
        None => process.name().to_string_lossy().into_owned(),
    }
}

/// Refresh the process table and count matches per pattern
fn scan(system: &mut System, patterns: &[String]) -> Vec<i64> {
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new()
            .with_cmd(UpdateKind::OnlyIfNotSet)
            .with_exe(UpdateKind::OnlyIfNotSet),
    );
    let lines: Vec<String> = system.processes().values().map(match_text).collect();
    count_matching(patterns, lines.iter().map(String::as_str))
}

/// Number of `names` containing each pattern, in pattern order
pub fn count_matching<'a, I>(patterns: &[String], names: I) -> Vec<i64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = vec![0i64; patterns.len()];
    for name in names {
        for (i, pattern) in patterns.iter().enumerate() {
            if name.contains(pattern.as_str()) {
                counts[i] += 1;
            }
        }
    }
    counts
}

/// Collector counting processes by command line
pub struct ProcessCollector {
    base: CollectorBase,
    patterns: Arc<[String]>,
    system: Arc<Mutex<System>>,
}

impl ProcessCollector {
    pub fn new(config: &ProcessConfig, ctx: &MetricsContext) -> Self {
        Self {
            base: CollectorBase::new(PREFIX, ctx),
            patterns: config.patterns().into(),
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn base(&self) -> &CollectorBase {
        &self.base
    }
}

#[async_trait]
impl Collector for ProcessCollector {
    fn prefix(&self) -> &str {
        self.base.prefix()
    }

    async fn collect(&self) {
        if self.patterns.is_empty() {
            return;
        }

        let system = Arc::clone(&self.system);
        let patterns = Arc::clone(&self.patterns);
        let counts =
            match tokio::task::spawn_blocking(move || scan(&mut system.lock(), &patterns)).await {
                Ok(counts) => counts,
                Err(e) => {
                    self.base.on_err("error_scan_processes", e);
                    return;
                }
            };

        for (pattern, count) in self.patterns.iter().zip(counts) {
            self.base.gauge_update(pattern, count);
        }
    }
}
