//! Process and system memory gauges.

use std::collections::BTreeMap;

use runtime_telemetry_core::{Metric, MetricSet};

use super::{gauge, UNAVAILABLE};

/// Memory used by this process.
///
/// Metrics:
/// - `rss` - Resident Set Size in bytes
/// - `virtual` - Virtual memory size in bytes
#[derive(Debug)]
pub struct MemoryUsageGaugeSet {
    gauges: BTreeMap<String, Metric>,
}

impl MemoryUsageGaugeSet {
    /// Creates the gauge set.
    pub fn new() -> Self {
        let mut gauges = BTreeMap::new();
        gauges.insert("rss".to_owned(), gauge(|| get_rss_bytes().unwrap_or(UNAVAILABLE)));
        gauges.insert(
            "virtual".to_owned(),
            gauge(|| get_virtual_bytes().unwrap_or(UNAVAILABLE)),
        );
        Self { gauges }
    }
}

impl Default for MemoryUsageGaugeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSet for MemoryUsageGaugeSet {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        self.gauges.clone()
    }
}

/// Memory available to the whole system.
///
/// Metrics:
/// - `system.total` - Physical memory in bytes
/// - `system.free` - Unused physical memory in bytes
/// - `system.available` - Memory available for new allocations in bytes
/// - `system.free-ratio` - `available / total`
#[derive(Debug)]
pub struct MemoryFreeGaugeSet {
    gauges: BTreeMap<String, Metric>,
}

impl MemoryFreeGaugeSet {
    /// Creates the gauge set.
    pub fn new() -> Self {
        let mut gauges = BTreeMap::new();
        gauges.insert(
            "system.total".to_owned(),
            gauge(|| get_meminfo().map_or(UNAVAILABLE, |m| m.total)),
        );
        gauges.insert(
            "system.free".to_owned(),
            gauge(|| get_meminfo().map_or(UNAVAILABLE, |m| m.free)),
        );
        gauges.insert(
            "system.available".to_owned(),
            gauge(|| get_meminfo().map_or(UNAVAILABLE, |m| m.available)),
        );
        gauges.insert(
            "system.free-ratio".to_owned(),
            gauge(|| get_meminfo().map_or(-1.0, |m| m.free_ratio())),
        );
        Self { gauges }
    }
}

impl Default for MemoryFreeGaugeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSet for MemoryFreeGaugeSet {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        self.gauges.clone()
    }
}

/// System memory figures in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct MemInfo {
    pub total: i64,
    pub free: i64,
    pub available: i64,
}

impl MemInfo {
    fn free_ratio(&self) -> f64 {
        if self.total <= 0 {
            return 0.0;
        }
        self.available as f64 / self.total as f64
    }
}

/// Parses `/proc/meminfo`. Values there are in kB.
pub(crate) fn parse_meminfo(contents: &str) -> Option<MemInfo> {
    let mut info = MemInfo::default();
    let mut seen_total = false;
    for line in contents.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kb) = rest.split_whitespace().next().and_then(|v| v.parse::<i64>().ok()) else {
            continue;
        };
        let bytes = kb.saturating_mul(1024);
        match key {
            "MemTotal" => {
                info.total = bytes;
                seen_total = true;
            }
            "MemFree" => info.free = bytes,
            "MemAvailable" => info.available = bytes,
            _ => {}
        }
    }
    if !seen_total {
        return None;
    }
    // kernels before 3.14 have no MemAvailable
    if info.available == 0 {
        info.available = info.free;
    }
    Some(info)
}

/// Parses `/proc/self/statm` into `(virtual, resident)` bytes.
pub(crate) fn parse_statm(contents: &str, page_size: i64) -> Option<(i64, i64)> {
    let mut parts = contents.split_whitespace();
    let size: i64 = parts.next()?.parse().ok()?;
    let resident: i64 = parts.next()?.parse().ok()?;
    Some((size.saturating_mul(page_size), resident.saturating_mul(page_size)))
}

#[cfg(target_os = "linux")]
fn get_meminfo() -> Option<MemInfo> {
    parse_meminfo(&std::fs::read_to_string("/proc/meminfo").ok()?)
}

#[cfg(not(target_os = "linux"))]
fn get_meminfo() -> Option<MemInfo> {
    None
}

#[cfg(target_os = "linux")]
fn read_statm() -> Option<(i64, i64)> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as i64;
    parse_statm(&statm, page_size)
}

/// Gets the RSS (Resident Set Size) in bytes.
#[cfg(target_os = "linux")]
fn get_rss_bytes() -> Option<i64> {
    read_statm().map(|(_, rss)| rss)
}

/// Gets the RSS (Resident Set Size) in bytes.
#[cfg(target_os = "macos")]
fn get_rss_bytes() -> Option<i64> {
    use std::mem;

    unsafe {
        let mut info: libc::rusage = mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut info) == 0 {
            // On macOS, ru_maxrss is in bytes
            Some(info.ru_maxrss)
        } else {
            None
        }
    }
}

/// Gets the RSS (Resident Set Size) in bytes.
#[cfg(target_os = "windows")]
fn get_rss_bytes() -> Option<i64> {
    use windows_sys::Win32::System::ProcessStatus::{
        GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS,
    };
    use windows_sys::Win32::System::Threading::GetCurrentProcess;

    unsafe {
        let process = GetCurrentProcess();
        let mut pmc: PROCESS_MEMORY_COUNTERS = std::mem::zeroed();
        pmc.cb = std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;

        if GetProcessMemoryInfo(
            process,
            &mut pmc,
            std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32,
        ) != 0
        {
            Some(pmc.WorkingSetSize as i64)
        } else {
            None
        }
    }
}

/// Fallback for unsupported platforms.
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn get_rss_bytes() -> Option<i64> {
    None
}

#[cfg(target_os = "linux")]
fn get_virtual_bytes() -> Option<i64> {
    read_statm().map(|(size, _)| size)
}

#[cfg(not(target_os = "linux"))]
fn get_virtual_bytes() -> Option<i64> {
    None
}

#[cfg(test)]
mod tests {
    use runtime_telemetry_core::{GaugeValue, Metric};

    use super::*;

    const MEMINFO: &str = "\
MemTotal:       16318488 kB
MemFree:         1197256 kB
MemAvailable:    8169600 kB
Buffers:          529120 kB
HugePages_Total:       0
";

    #[test]
    fn test_parse_meminfo() {
        let info = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(info.total, 16318488 * 1024);
        assert_eq!(info.free, 1197256 * 1024);
        assert_eq!(info.available, 8169600 * 1024);
        assert!((info.free_ratio() - 0.5006).abs() < 1e-3);
    }

    #[test]
    fn test_parse_meminfo_without_available() {
        let info = parse_meminfo("MemTotal: 100 kB\nMemFree: 40 kB\n").unwrap();
        assert_eq!(info.available, 40 * 1024);
        assert!(parse_meminfo("garbage").is_none());
    }

    #[test]
    fn test_parse_statm() {
        assert_eq!(parse_statm("2000 500 100 1 0 300 0\n", 4096), Some((2000 * 4096, 500 * 4096)));
        assert_eq!(parse_statm("2000", 4096), None);
        assert_eq!(parse_statm("", 4096), None);
    }

    #[test]
    fn test_memory_usage_set() {
        let metrics = MemoryUsageGaugeSet::new().metrics();
        assert_eq!(metrics.keys().collect::<Vec<_>>(), vec!["rss", "virtual"]);

        #[cfg(target_os = "linux")]
        match &metrics["rss"] {
            Metric::Gauge(g) => match g.value() {
                GaugeValue::Long(rss) => assert!(rss > 0),
                other => panic!("unexpected value {:?}", other),
            },
            other => panic!("unexpected metric {:?}", other),
        }
    }

    #[test]
    fn test_memory_free_set_names() {
        let set = MemoryFreeGaugeSet::new();
        let metrics = set.metrics();
        assert_eq!(
            metrics.keys().collect::<Vec<_>>(),
            vec!["system.available", "system.free", "system.free-ratio", "system.total"]
        );
        // the same objects on every call
        assert!(metrics["system.total"].ptr_eq(&set.metrics()["system.total"]));
    }
}
