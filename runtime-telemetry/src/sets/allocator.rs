//! Native allocator statistics from jemalloc.

use std::collections::BTreeMap;

use runtime_telemetry_core::{Metric, MetricSet};
use tikv_jemalloc_ctl::{epoch, stats};

use super::{gauge, UNAVAILABLE};

type StatReader = fn() -> tikv_jemalloc_ctl::Result<usize>;

const STATS: [(&str, StatReader); 6] = [
    ("allocated", stats::allocated::read),
    ("active", stats::active::read),
    ("resident", stats::resident::read),
    ("mapped", stats::mapped::read),
    ("retained", stats::retained::read),
    ("metadata", stats::metadata::read),
];

/// Statistics of the jemalloc global allocator, in bytes.
///
/// Metrics: `allocated`, `active`, `resident`, `mapped`, `retained`,
/// `metadata`.
///
/// Only meaningful when jemalloc is the process' global allocator.
#[derive(Debug)]
pub struct AllocatorGaugeSet {
    gauges: BTreeMap<String, Metric>,
}

impl AllocatorGaugeSet {
    /// Creates the gauge set.
    pub fn new() -> Self {
        let gauges = STATS
            .iter()
            .map(|&(name, read)| (name.to_owned(), gauge(move || read_stat(read))))
            .collect();
        Self { gauges }
    }
}

impl Default for AllocatorGaugeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSet for AllocatorGaugeSet {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        self.gauges.clone()
    }
}

fn read_stat(read: StatReader) -> i64 {
    // Advance the epoch to get fresh stats
    if epoch::advance().is_err() {
        return UNAVAILABLE;
    }
    read().map_or(UNAVAILABLE, |v| i64::try_from(v).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_set_names() {
        let metrics = AllocatorGaugeSet::new().metrics();
        assert_eq!(
            metrics.keys().collect::<Vec<_>>(),
            vec!["active", "allocated", "mapped", "metadata", "resident", "retained"]
        );
    }
}
