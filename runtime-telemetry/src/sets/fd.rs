//! File descriptor gauges.

use std::collections::BTreeMap;

use runtime_telemetry_core::{Metric, MetricSet};

use super::{gauge, UNAVAILABLE};

/// File descriptors of this process.
///
/// Metrics:
/// - `open` - Open file descriptors
/// - `max` - Soft limit on open file descriptors
/// - `usage` - `open / max`, or `-1` if either is unknown
#[derive(Debug)]
pub struct FileDescriptorGaugeSet {
    gauges: BTreeMap<String, Metric>,
}

impl FileDescriptorGaugeSet {
    /// Creates the gauge set.
    pub fn new() -> Self {
        let mut gauges = BTreeMap::new();
        gauges.insert(
            "open".to_owned(),
            gauge(|| get_open_fds().unwrap_or(UNAVAILABLE)),
        );
        gauges.insert(
            "max".to_owned(),
            gauge(|| get_max_fds().unwrap_or(UNAVAILABLE)),
        );
        gauges.insert(
            "usage".to_owned(),
            gauge(|| usage_ratio(get_open_fds(), get_max_fds())),
        );
        Self { gauges }
    }
}

impl Default for FileDescriptorGaugeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSet for FileDescriptorGaugeSet {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        self.gauges.clone()
    }
}

fn usage_ratio(open: Option<i64>, max: Option<i64>) -> f64 {
    match (open, max) {
        (Some(open), Some(max)) if max > 0 => open as f64 / max as f64,
        _ => -1.0,
    }
}

/// Gets the number of open file descriptors.
#[cfg(target_os = "linux")]
fn get_open_fds() -> Option<i64> {
    use std::fs;

    let entries = fs::read_dir("/proc/self/fd").ok()?;
    // the directory handle used for listing is itself counted
    Some(entries.count().saturating_sub(1) as i64)
}

/// Gets the number of open file descriptors.
#[cfg(all(unix, not(target_os = "linux")))]
fn get_open_fds() -> Option<i64> {
    use std::fs;

    let entries = fs::read_dir("/dev/fd").ok()?;
    Some(entries.count().saturating_sub(1) as i64)
}

/// Fallback for unsupported platforms.
#[cfg(not(unix))]
fn get_open_fds() -> Option<i64> {
    None
}

/// Gets the soft `RLIMIT_NOFILE` limit.
#[cfg(unix)]
fn get_max_fds() -> Option<i64> {
    use std::mem;

    unsafe {
        let mut limit: libc::rlimit = mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) != 0 {
            return None;
        }
        if limit.rlim_cur == libc::RLIM_INFINITY {
            return None;
        }
        i64::try_from(limit.rlim_cur).ok()
    }
}

/// Fallback for unsupported platforms.
#[cfg(not(unix))]
fn get_max_fds() -> Option<i64> {
    None
}
