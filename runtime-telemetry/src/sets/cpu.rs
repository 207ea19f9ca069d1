//! CPU load and uptime gauges.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use runtime_telemetry_core::{Metric, MetricSet};

use super::gauge;

/// Process CPU load.
///
/// Metrics:
/// - `load` - CPU time used by this process since the previous poll, divided
///   by the wall time elapsed and the number of available CPUs
///
/// The first poll has nothing to compare against and reports `0`.
#[derive(Debug)]
pub struct CpuLoadGauge {
    load: Metric,
}

#[derive(Debug, Default)]
struct CpuSampler {
    last: Mutex<Option<(Instant, Duration)>>,
}

impl CpuSampler {
    fn poll(&self) -> f64 {
        let Some(cpu) = get_cpu_time() else {
            return -1.0;
        };
        let now = Instant::now();
        let previous = self
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((now, cpu));
        match previous {
            Some((at, used)) => cpu_load(
                cpu.saturating_sub(used),
                now.saturating_duration_since(at),
                available_cpus(),
            ),
            None => 0.0,
        }
    }
}

impl CpuLoadGauge {
    /// Creates the gauge.
    pub fn new() -> Self {
        let sampler = Arc::new(CpuSampler::default());
        Self {
            load: gauge(move || sampler.poll()),
        }
    }
}

impl Default for CpuLoadGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSet for CpuLoadGauge {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        BTreeMap::from([("load".to_owned(), self.load.clone())])
    }
}

/// Process uptime.
///
/// Metrics:
/// - `uptime` - Seconds since the gauge was created
#[derive(Debug)]
pub struct UptimeGauge {
    start_time: Instant,
    uptime: Metric,
}

impl UptimeGauge {
    /// Creates the gauge, starting the clock now.
    pub fn new() -> Self {
        let start_time = Instant::now();
        Self {
            start_time,
            uptime: gauge(move || start_time.elapsed().as_secs()),
        }
    }

    /// When the clock was started.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }
}

impl Default for UptimeGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSet for UptimeGauge {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        BTreeMap::from([("uptime".to_owned(), self.uptime.clone())])
    }
}

fn cpu_load(cpu: Duration, wall: Duration, cpus: usize) -> f64 {
    if wall.is_zero() || cpus == 0 {
        return 0.0;
    }
    let load = cpu.as_secs_f64() / wall.as_secs_f64() / cpus as f64;
    load.clamp(0.0, 1.0)
}

fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Gets user plus system CPU time of this process.
#[cfg(unix)]
fn get_cpu_time() -> Option<Duration> {
    use std::mem;

    fn to_duration(tv: libc::timeval) -> Duration {
        Duration::from_secs(tv.tv_sec.max(0) as u64)
            + Duration::from_micros(tv.tv_usec.max(0) as u64)
    }

    unsafe {
        let mut usage: libc::rusage = mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
            Some(to_duration(usage.ru_utime) + to_duration(usage.ru_stime))
        } else {
            None
        }
    }
}

/// Gets user plus kernel CPU time of this process.
#[cfg(target_os = "windows")]
fn get_cpu_time() -> Option<Duration> {
    use windows_sys::Win32::Foundation::FILETIME;
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, GetProcessTimes};

    unsafe {
        let process = GetCurrentProcess();
        let mut creation: FILETIME = std::mem::zeroed();
        let mut exit: FILETIME = std::mem::zeroed();
        let mut kernel: FILETIME = std::mem::zeroed();
        let mut user: FILETIME = std::mem::zeroed();

        if GetProcessTimes(process, &mut creation, &mut exit, &mut kernel, &mut user) != 0 {
            // FILETIME is in 100-nanosecond intervals
            let user_100ns = ((user.dwHighDateTime as u64) << 32) | (user.dwLowDateTime as u64);
            let kernel_100ns =
                ((kernel.dwHighDateTime as u64) << 32) | (kernel.dwLowDateTime as u64);
            Some(Duration::from_nanos((user_100ns + kernel_100ns).saturating_mul(100)))
        } else {
            None
        }
    }
}

/// Fallback for unsupported platforms.
#[cfg(not(any(unix, target_os = "windows")))]
fn get_cpu_time() -> Option<Duration> {
    None
}

#[cfg(test)]
mod tests {
    use runtime_telemetry_core::GaugeValue;

    use super::*;

    fn poll(metric: &Metric) -> GaugeValue {
        match metric {
            Metric::Gauge(g) => g.value(),
            other => panic!("unexpected metric {:?}", other),
        }
    }

    #[test]
    fn test_cpu_load_math() {
        let second = Duration::from_secs(1);
        assert_eq!(cpu_load(second, second * 2, 1), 0.5);
        assert_eq!(cpu_load(second, second, 4), 0.25);
        assert_eq!(cpu_load(second * 8, second, 4), 1.0);
        assert_eq!(cpu_load(second, Duration::ZERO, 4), 0.0);
        assert_eq!(cpu_load(second, second, 0), 0.0);
    }

    #[test]
    fn test_cpu_load_first_poll_is_zero() {
        let gauge = CpuLoadGauge::new();
        let load = &gauge.metrics()["load"];

        #[cfg(unix)]
        {
            assert_eq!(poll(load), GaugeValue::Double(0.0));
            match poll(load) {
                GaugeValue::Double(v) => assert!((0.0..=1.0).contains(&v)),
                other => panic!("unexpected value {:?}", other),
            }
        }
        #[cfg(not(unix))]
        let _ = load;
    }

    #[test]
    fn test_uptime() {
        let gauge = UptimeGauge::new();
        assert!(gauge.start_time() <= Instant::now());
        assert_eq!(poll(&gauge.metrics()["uptime"]), GaugeValue::Long(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_cpu_time() {
        assert!(get_cpu_time().is_some());
    }
}
