//! Process and host resource sampling

use std::fs;

/// One resource reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    /// Resident set size of this process
    pub rss_mb: f64,
    /// Share of system memory in use, when known
    pub system_memory_pct: Option<f64>,
}

/// Source of resource readings for periodic statistics
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> Option<ResourceUsage>;
}

/// Reads `/proc/self/status` and `/proc/meminfo`; yields nothing on
/// platforms without procfs
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsProbe;

impl ResourceProbe for ProcfsProbe {
    fn sample(&self) -> Option<ResourceUsage> {
        let status = fs::read_to_string("/proc/self/status").ok()?;
        let rss_kb = parse_kb(&status, "VmRSS:")?;

        let system_memory_pct = fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|meminfo| memory_used_pct(&meminfo));

        Some(ResourceUsage {
            rss_mb: rss_kb as f64 / 1024.0,
            system_memory_pct,
        })
    }
}

/// Value of a `Key:   1234 kB` line
fn parse_kb(content: &str, key: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

fn memory_used_pct(meminfo: &str) -> Option<f64> {
    let total = parse_kb(meminfo, "MemTotal:")?;
    let available = parse_kb(meminfo, "MemAvailable:")?;
    if total == 0 {
        return None;
    }
    Some(total.saturating_sub(available) as f64 / total as f64 * 100.0)
}
