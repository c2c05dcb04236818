//! System Collector
//!
//! Host-wide statistics from `sysinfo`: uptime, load averages, CPU usage,
//! memory and swap, per-interface network counters and per-mount disk usage.
//! On Linux, procfs adds protocol counters, page cache and swap traffic.
//!
//! Network counters are cumulative in the kernel and are fed through the
//! delta tracker. CPU usage needs two samples, so the first pass only primes
//! it. Sampling blocks and runs on the blocking pool.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use sysinfo::{Disks, Networks, System};

use crate::collector::{Collector, CollectorBase};
use crate::context::MetricsContext;
use crate::error::Error;
use crate::metrics::make_metric;

use super::procfs::{self, ProcfsRead, ProtoStat};

pub const PREFIX: &str = "system";

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;

// =============================================================================
// Configuration
// =============================================================================

/// `[collector.system]` section
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    /// Report each CPU
    pub per_cpu: bool,

    /// Report the aggregate of all CPUs
    pub total_cpu: bool,

    /// Only report these mount points (all when empty)
    pub mount_points: Vec<String>,

    /// Skip these filesystem types
    pub ignore_fs: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            per_cpu: false,
            total_cpu: true,
            mount_points: Vec::new(),
            ignore_fs: Vec::new(),
        }
    }
}

impl SystemConfig {
    /// Whether a mount should be reported
    pub fn disk_selected(&self, mount_point: &str, fs_type: &str) -> bool {
        if !self.mount_points.is_empty() && !self.mount_points.iter().any(|m| m == mount_point) {
            return false;
        }
        !self.ignore_fs.iter().any(|f| f == fs_type)
    }
}

// =============================================================================
// Field Calculations
// =============================================================================

/// `mem.*` fields in MB / percent
pub fn memory_fields(total: u64, available: u64, free: u64) -> Vec<(&'static str, f64)> {
    let pct_usable = if total > 0 {
        100.0 * available as f64 / total as f64
    } else {
        0.0
    };
    vec![
        ("total", total as f64 / MB),
        ("usable", available as f64 / MB),
        ("used", total.saturating_sub(free) as f64 / MB),
        ("free", free as f64 / MB),
        ("pct_usable", pct_usable),
    ]
}

/// `swap.*` fields in MB / percent
pub fn swap_fields(total: u64, used: u64, free: u64) -> Vec<(&'static str, f64)> {
    let pct_free = if total > 0 {
        100.0 * free as f64 / total as f64
    } else {
        100.0
    };
    vec![
        ("total", total as f64 / MB),
        ("used", used as f64 / MB),
        ("free", free as f64 / MB),
        ("pct_free", pct_free),
    ]
}

/// `disk.*` fields in KB, `in_use` as a fraction
pub fn disk_fields(total: u64, available: u64) -> Vec<(&'static str, f64)> {
    let used = total.saturating_sub(available);
    let in_use = if total > 0 {
        used as f64 / total as f64
    } else {
        0.0
    };
    vec![
        ("disk.total", total as f64 / KB),
        ("disk.free", available as f64 / KB),
        ("disk.used", used as f64 / KB),
        ("disk.in_use", in_use),
    ]
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

// =============================================================================
// Sampling
// =============================================================================

const NETWORK_FIELDS: usize = 6;

struct MemorySample {
    total: u64,
    available: u64,
    free: u64,
    swap_total: u64,
    swap_used: u64,
    swap_free: u64,
}

struct DiskSample {
    path: String,
    fstype: String,
    total: u64,
    available: u64,
}

/// Readings of one pass, taken on the blocking pool
struct HostSample {
    uptime: u64,
    load: [f64; 3],
    /// Per-CPU and global usage; `None` on the priming pass
    cpu: Option<(Vec<(String, f32)>, f32)>,
    memory: MemorySample,
    networks: Vec<(String, [(&'static str, u64); NETWORK_FIELDS])>,
    disks: Vec<DiskSample>,
    procfs: Option<ProcfsRead>,
}

struct Samplers {
    system: System,
    networks: Networks,
    disks: Disks,
    cpu_primed: bool,
}

impl Samplers {
    fn sample(&mut self) -> HostSample {
        let load = System::load_average();

        self.system.refresh_cpu_all();
        let cpu = if self.cpu_primed {
            let per_cpu = self
                .system
                .cpus()
                .iter()
                .map(|c| (c.name().to_string(), c.cpu_usage()))
                .collect();
            Some((per_cpu, self.system.global_cpu_usage()))
        } else {
            self.cpu_primed = true;
            None
        };

        self.system.refresh_memory();
        let memory = MemorySample {
            total: self.system.total_memory(),
            available: self.system.available_memory(),
            free: self.system.free_memory(),
            swap_total: self.system.total_swap(),
            swap_used: self.system.used_swap(),
            swap_free: self.system.free_swap(),
        };

        self.networks.refresh();
        let networks = self
            .networks
            .iter()
            .map(|(iface, data)| {
                let fields = [
                    ("bytes_sent", data.total_transmitted()),
                    ("bytes_rcvd", data.total_received()),
                    ("packets_in.count", data.total_packets_received()),
                    ("packets_in.error", data.total_errors_on_received()),
                    ("packets_out.count", data.total_packets_transmitted()),
                    ("packets_out.error", data.total_errors_on_transmitted()),
                ];
                (iface.clone(), fields)
            })
            .collect();

        self.disks.refresh();
        let disks = self
            .disks
            .iter()
            .map(|disk| DiskSample {
                path: disk.mount_point().to_string_lossy().into_owned(),
                fstype: disk.file_system().to_string_lossy().into_owned(),
                total: disk.total_space(),
                available: disk.available_space(),
            })
            .collect();

        #[cfg(target_os = "linux")]
        let procfs = Some(ProcfsRead::read());
        #[cfg(not(target_os = "linux"))]
        let procfs = None;

        HostSample {
            uptime: System::uptime(),
            load: [load.one, load.five, load.fifteen],
            cpu,
            memory,
            networks,
            disks,
            procfs,
        }
    }
}

// =============================================================================
// Collector
// =============================================================================

/// Collector for host-wide statistics
pub struct SystemCollector {
    base: CollectorBase,
    config: SystemConfig,
    samplers: Arc<Mutex<Samplers>>,
}

impl SystemCollector {
    pub fn new(config: SystemConfig, ctx: &MetricsContext) -> Self {
        Self {
            base: CollectorBase::new(PREFIX, ctx),
            config,
            samplers: Arc::new(Mutex::new(Samplers {
                system: System::new(),
                networks: Networks::new_with_refreshed_list(),
                disks: Disks::new_with_refreshed_list(),
                cpu_primed: false,
            })),
        }
    }

    pub fn base(&self) -> &CollectorBase {
        &self.base
    }

    fn record(&self, sample: HostSample) {
        self.base.gauge_update("uptime", to_i64(sample.uptime));
        for (name, value) in ["load1", "load5", "load15"].into_iter().zip(sample.load) {
            self.base.gauge_float64_update(name, value);
        }

        if let Some((per_cpu, global)) = &sample.cpu {
            self.record_cpu(per_cpu, *global);
        }
        self.record_memory(&sample.memory);
        self.record_network(&sample.networks);
        self.record_disks(&sample.disks);
        if let Some(files) = &sample.procfs {
            self.record_procfs(files);
        }
    }

    fn record_cpu(&self, per_cpu: &[(String, f32)], global: f32) {
        if self.config.per_cpu {
            for (name, usage) in per_cpu {
                self.base
                    .gauge_float64_update(&format!("cpu.{}.usage", name), *usage as f64);
            }
        }
        if self.config.total_cpu {
            self.base
                .gauge_float64_update("cpu.cpu-total.usage", global as f64);
        }
    }

    fn record_memory(&self, memory: &MemorySample) {
        if memory.total == 0 {
            self.base.on_err(
                "error_collect_mem",
                anyhow::anyhow!("total memory reported as zero"),
            );
            return;
        }

        for (field, value) in memory_fields(memory.total, memory.available, memory.free) {
            self.base.gauge_float64_update(&format!("mem.{}", field), value);
        }
        for (field, value) in swap_fields(memory.swap_total, memory.swap_used, memory.swap_free) {
            self.base.gauge_float64_update(&format!("swap.{}", field), value);
        }
    }

    fn record_network(&self, networks: &[(String, [(&'static str, u64); NETWORK_FIELDS])]) {
        for (iface, fields) in networks {
            for (field, value) in fields {
                let name = format!("net.{}.{}", iface, field);
                self.base.counter_inc_total(&name, to_i64(*value));
            }
        }
    }

    fn record_disks(&self, disks: &[DiskSample]) {
        for disk in disks {
            // Pseudo filesystems report no capacity
            if disk.total == 0 || !self.config.disk_selected(&disk.path, &disk.fstype) {
                continue;
            }

            let tags: HashMap<&str, &str> = [
                ("path", disk.path.as_str()),
                ("fstype", disk.fstype.as_str()),
            ]
            .into_iter()
            .collect();
            for (field, value) in disk_fields(disk.total, disk.available) {
                self.base
                    .gauge_float64_update(&make_metric(field, &tags), value);
            }
        }
    }

    fn record_procfs(&self, files: &ProcfsRead) {
        if let Some(content) = self.read_or_record(procfs::NET_SNMP, &files.net_snmp) {
            match procfs::parse_net_snmp(content) {
                Ok(stats) => self.record_net_proto(&stats),
                Err(e) => self.base.on_err("error_parse_procfs", e),
            }
        }

        if let Some(content) = self.read_or_record(procfs::MEMINFO, &files.meminfo) {
            let cached = procfs::parse_meminfo(content).and_then(|info| {
                Ok([
                    ("mem.cached", procfs::require(&info, procfs::MEMINFO, "Cached")?),
                    ("mem.buffered", procfs::require(&info, procfs::MEMINFO, "Buffers")?),
                ])
            });
            match cached {
                Ok(fields) => {
                    for (name, kb) in fields {
                        self.base.gauge_float64_update(name, kb as f64 * KB / MB);
                    }
                }
                Err(e) => self.base.on_err("error_parse_procfs", e),
            }
        }

        if let Some(content) = self.read_or_record(procfs::VMSTAT, &files.vmstat) {
            let swapped = procfs::parse_vmstat(content).and_then(|stat| {
                Ok([
                    ("swap.swapped_in", procfs::require(&stat, procfs::VMSTAT, "pswpin")?),
                    ("swap.swapped_out", procfs::require(&stat, procfs::VMSTAT, "pswpout")?),
                ])
            });
            match swapped {
                Ok(fields) => {
                    for (name, pages) in fields {
                        let bytes = pages.saturating_mul(procfs::SWAP_PAGE_SIZE as i64);
                        self.base.gauge_float64_update(name, bytes as f64);
                    }
                }
                Err(e) => self.base.on_err("error_parse_procfs", e),
            }
        }
    }

    /// `net.<proto>_<stat>.interface=all` gauges
    fn record_net_proto(&self, stats: &[ProtoStat]) {
        let tags: HashMap<&str, &str> = [("interface", "all")].into_iter().collect();
        for stat in stats {
            let name = format!(
                "net.{}_{}",
                stat.protocol.to_lowercase(),
                stat.stat.to_lowercase()
            );
            self.base.gauge_update(&make_metric(&name, &tags), stat.value);
        }
    }

    fn read_or_record<'a>(&self, file: &str, read: &'a io::Result<String>) -> Option<&'a str> {
        match read {
            Ok(content) => Some(content),
            Err(e) => {
                self.base.on_err(
                    "error_read_procfs",
                    Error::Procfs {
                        file: file.to_string(),
                        reason: e.to_string(),
                    },
                );
                None
            }
        }
    }
}

#[async_trait]
impl Collector for SystemCollector {
    fn prefix(&self) -> &str {
        self.base.prefix()
    }

    async fn collect(&self) {
        let samplers = Arc::clone(&self.samplers);
        match tokio::task::spawn_blocking(move || samplers.lock().sample()).await {
            Ok(sample) => self.record(sample),
            Err(e) => self.base.on_err("error_sample_host", e),
        }
    }
}
