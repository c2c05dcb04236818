//! Linux procfs readers
//!
//! Host statistics `sysinfo` does not expose: per-protocol counters from
//! `/proc/net/snmp`, page cache and buffers from `/proc/meminfo`, and swap
//! traffic from `/proc/vmstat`. Parsers are plain functions over the file
//! contents; only [`ProcfsRead::read`] touches the filesystem.

use std::collections::HashMap;
use std::io;

use crate::error::{Error, Result};

pub const NET_SNMP: &str = "/proc/net/snmp";
pub const MEMINFO: &str = "/proc/meminfo";
pub const VMSTAT: &str = "/proc/vmstat";

/// Bytes per page counted by `pswpin`/`pswpout`
pub const SWAP_PAGE_SIZE: u64 = 4096;

/// One `<Proto>: <Stat>` counter from `/proc/net/snmp`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoStat {
    pub protocol: String,
    pub stat: String,
    pub value: i64,
}

fn malformed(file: &str, reason: impl Into<String>) -> Error {
    Error::Procfs {
        file: file.to_string(),
        reason: reason.into(),
    }
}

/// Parse `/proc/net/snmp`: header and value lines come in pairs per protocol
pub fn parse_net_snmp(content: &str) -> Result<Vec<ProtoStat>> {
    let mut stats = Vec::new();
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    while let Some(header) = lines.next() {
        let values = lines
            .next()
            .ok_or_else(|| malformed(NET_SNMP, format!("no values for {:?}", header)))?;

        let (protocol, names) = header
            .split_once(':')
            .ok_or_else(|| malformed(NET_SNMP, format!("missing protocol in {:?}", header)))?;
        let (value_protocol, numbers) = values
            .split_once(':')
            .ok_or_else(|| malformed(NET_SNMP, format!("missing protocol in {:?}", values)))?;
        if protocol != value_protocol {
            return Err(malformed(
                NET_SNMP,
                format!("{} header followed by {} values", protocol, value_protocol),
            ));
        }

        let names: Vec<&str> = names.split_whitespace().collect();
        let numbers: Vec<&str> = numbers.split_whitespace().collect();
        if names.len() != numbers.len() {
            return Err(malformed(
                NET_SNMP,
                format!(
                    "{} has {} fields but {} values",
                    protocol,
                    names.len(),
                    numbers.len()
                ),
            ));
        }

        for (stat, raw) in names.into_iter().zip(numbers) {
            let value = raw
                .parse::<i64>()
                .map_err(|_| malformed(NET_SNMP, format!("{}.{} = {:?}", protocol, stat, raw)))?;
            stats.push(ProtoStat {
                protocol: protocol.to_string(),
                stat: stat.to_string(),
                value,
            });
        }
    }

    Ok(stats)
}

/// Parse `/proc/meminfo` into `key → value` (kB for sized entries)
pub fn parse_meminfo(content: &str) -> Result<HashMap<String, u64>> {
    let mut out = HashMap::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let (key, rest) = line
            .split_once(':')
            .ok_or_else(|| malformed(MEMINFO, format!("no separator in {:?}", line)))?;
        let value = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| malformed(MEMINFO, format!("bad value in {:?}", line)))?;
        out.insert(key.trim().to_string(), value);
    }
    Ok(out)
}

/// Parse `/proc/vmstat` into `key → value`
pub fn parse_vmstat(content: &str) -> Result<HashMap<String, i64>> {
    let mut out = HashMap::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(raw), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed(VMSTAT, format!("expected `key value`, got {:?}", line)));
        };
        let value = raw
            .parse::<i64>()
            .map_err(|_| malformed(VMSTAT, format!("bad value in {:?}", line)))?;
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

/// Look up a required entry of a parsed procfs map
pub fn require<V: Copy>(map: &HashMap<String, V>, file: &str, key: &str) -> Result<V> {
    map.get(key)
        .copied()
        .ok_or_else(|| malformed(file, format!("{} missing", key)))
}

/// Raw contents of the procfs files read in one pass
#[derive(Debug)]
pub struct ProcfsRead {
    pub net_snmp: io::Result<String>,
    pub meminfo: io::Result<String>,
    pub vmstat: io::Result<String>,
}

impl ProcfsRead {
    #[cfg(target_os = "linux")]
    pub fn read() -> Self {
        Self {
            net_snmp: std::fs::read_to_string(NET_SNMP),
            meminfo: std::fs::read_to_string(MEMINFO),
            vmstat: std::fs::read_to_string(VMSTAT),
        }
    }
}
