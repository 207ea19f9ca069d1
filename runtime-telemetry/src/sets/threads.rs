//! Thread count and thread state gauges.

use std::collections::BTreeMap;

use runtime_telemetry_core::{Metric, MetricSet};

use super::{gauge, UNAVAILABLE};

/// Scheduler state of a single thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ThreadState {
    Running,
    Sleeping,
    DiskSleep,
    Stopped,
    Zombie,
    Other,
}

impl ThreadState {
    const ALL: [ThreadState; 6] = [
        ThreadState::Running,
        ThreadState::Sleeping,
        ThreadState::DiskSleep,
        ThreadState::Stopped,
        ThreadState::Zombie,
        ThreadState::Other,
    ];

    fn from_code(code: char) -> Self {
        match code {
            'R' => ThreadState::Running,
            'S' | 'I' => ThreadState::Sleeping,
            'D' => ThreadState::DiskSleep,
            'T' | 't' => ThreadState::Stopped,
            'Z' | 'X' => ThreadState::Zombie,
            _ => ThreadState::Other,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ThreadState::Running => "running",
            ThreadState::Sleeping => "sleeping",
            ThreadState::DiskSleep => "disk-sleep",
            ThreadState::Stopped => "stopped",
            ThreadState::Zombie => "zombie",
            ThreadState::Other => "other",
        }
    }
}

/// Threads of this process, by state.
///
/// Metrics:
/// - `count` - Number of threads
/// - `running`, `sleeping`, `disk-sleep`, `stopped`, `zombie`, `other` -
///   Number of threads in each state
///
/// Per-state counts are only available on Linux.
#[derive(Debug)]
pub struct ThreadStatesGaugeSet {
    gauges: BTreeMap<String, Metric>,
}

impl ThreadStatesGaugeSet {
    /// Creates the gauge set.
    pub fn new() -> Self {
        let mut gauges = BTreeMap::new();
        gauges.insert(
            "count".to_owned(),
            gauge(|| get_thread_count().unwrap_or(UNAVAILABLE)),
        );
        for state in ThreadState::ALL {
            gauges.insert(
                state.as_str().to_owned(),
                gauge(move || {
                    get_thread_states().map_or(UNAVAILABLE, |states| {
                        states.iter().filter(|s| **s == state).count() as i64
                    })
                }),
            );
        }
        Self { gauges }
    }
}

impl Default for ThreadStatesGaugeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSet for ThreadStatesGaugeSet {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        self.gauges.clone()
    }
}

/// Extracts the state from a `/proc/<pid>/task/<tid>/stat` line.
///
/// The command name is parenthesized and may itself contain spaces and
/// parentheses, so the state is the first field after the last `)`.
pub(crate) fn parse_stat_state(stat: &str) -> Option<ThreadState> {
    let (_, rest) = stat.rsplit_once(')')?;
    let code = rest.split_whitespace().next()?.chars().next()?;
    Some(ThreadState::from_code(code))
}

/// Gets the number of threads in the current process.
#[cfg(target_os = "linux")]
fn get_thread_count() -> Option<i64> {
    use std::fs;

    // Count entries in /proc/self/task/
    let entries = fs::read_dir("/proc/self/task").ok()?;
    Some(entries.count() as i64)
}

/// Fallback for platforms without procfs.
#[cfg(not(target_os = "linux"))]
fn get_thread_count() -> Option<i64> {
    None
}

#[cfg(target_os = "linux")]
fn get_thread_states() -> Option<Vec<ThreadState>> {
    use std::fs;

    let entries = fs::read_dir("/proc/self/task").ok()?;
    let mut states = Vec::new();
    for entry in entries.flatten() {
        // threads may exit between listing and reading
        if let Ok(stat) = fs::read_to_string(entry.path().join("stat")) {
            if let Some(state) = parse_stat_state(&stat) {
                states.push(state);
            }
        }
    }
    Some(states)
}

#[cfg(not(target_os = "linux"))]
fn get_thread_states() -> Option<Vec<ThreadState>> {
    None
}
