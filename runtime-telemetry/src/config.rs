//! Configuration for runtime telemetry.

use std::sync::Arc;

use runtime_telemetry_core::MetricSet;
use runtime_telemetry_gc::GcMetricsOptions;

/// Configuration for [`RuntimeTelemetry`](crate::RuntimeTelemetry).
#[derive(Clone)]
pub struct RuntimeTelemetryConfig {
    /// Name every metric is registered under.
    ///
    /// Default: `runtime`
    pub base: String,

    /// Enable memory metrics.
    ///
    /// Registers: `<base>.mem.rss`, `<base>.mem.virtual`, `<base>.mem.system.*`
    ///
    /// Default: true
    pub collect_memory: bool,

    /// Enable process metrics.
    ///
    /// Registers: `<base>.thread.*`, `<base>.fd.*`, `<base>.cpu.load`,
    /// `<base>.uptime`
    ///
    /// Default: true
    pub collect_process: bool,

    /// Enable native allocator metrics.
    ///
    /// Registers: `<base>.nmt.*` (with the `jemalloc` feature)
    ///
    /// Default: true
    pub collect_allocator: bool,

    /// Enable polled per-collector metrics.
    ///
    /// Registers: `<base>.gc.<collector>.count`, `<base>.gc.<collector>.time`
    ///
    /// Default: true
    pub collect_gc: bool,

    /// Options of the garbage collection metrics.
    ///
    /// The prefix is always derived from `base` as `<base>.gc-mem`.
    pub gc: GcMetricsOptions,

    /// Custom metric sets, each registered under `<base>.<namespace>.`.
    pub custom_sets: Vec<(String, Arc<dyn MetricSet>)>,
}

impl Default for RuntimeTelemetryConfig {
    fn default() -> Self {
        Self {
            base: "runtime".to_owned(),
            collect_memory: true,
            collect_process: true,
            collect_allocator: true,
            collect_gc: true,
            gc: GcMetricsOptions::default(),
            custom_sets: Vec::new(),
        }
    }
}

impl RuntimeTelemetryConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base name.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// Enables or disables memory metrics.
    #[must_use]
    pub fn with_memory_metrics(mut self, enabled: bool) -> Self {
        self.collect_memory = enabled;
        self
    }

    /// Enables or disables process metrics.
    #[must_use]
    pub fn with_process_metrics(mut self, enabled: bool) -> Self {
        self.collect_process = enabled;
        self
    }

    /// Enables or disables native allocator metrics.
    #[must_use]
    pub fn with_allocator_metrics(mut self, enabled: bool) -> Self {
        self.collect_allocator = enabled;
        self
    }

    /// Enables or disables the polled per-collector metrics.
    #[must_use]
    pub fn with_collector_metrics(mut self, enabled: bool) -> Self {
        self.collect_gc = enabled;
        self
    }

    /// Sets the garbage collection options.
    #[must_use]
    pub fn with_gc_options(mut self, gc: GcMetricsOptions) -> Self {
        self.gc = gc;
        self
    }

    /// Adds a custom metric set.
    #[must_use]
    pub fn add_set<S: MetricSet + 'static>(mut self, namespace: impl Into<String>, set: S) -> Self {
        let set: Arc<dyn MetricSet> = Arc::new(set);
        self.custom_sets.push((namespace.into(), set));
        self
    }

    pub(crate) fn gc_prefix(&self) -> String {
        format!("{}.gc-mem", self.base)
    }
}

impl std::fmt::Debug for RuntimeTelemetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeTelemetryConfig")
            .field("base", &self.base)
            .field("collect_memory", &self.collect_memory)
            .field("collect_process", &self.collect_process)
            .field("collect_allocator", &self.collect_allocator)
            .field("collect_gc", &self.collect_gc)
            .field("gc", &self.gc)
            .field(
                "custom_sets",
                &self.custom_sets.iter().map(|(ns, _)| ns).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use runtime_telemetry_core::{Counter, Metric};

    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeTelemetryConfig::new();
        assert_eq!(config.base, "runtime");
        assert!(config.collect_memory && config.collect_process && config.collect_allocator);
        assert!(config.collect_gc);
        assert_eq!(config.gc_prefix(), "runtime.gc-mem");
    }

    #[test]
    fn test_debug_lists_custom_namespaces() {
        let mut set = BTreeMap::new();
        set.insert("requests".to_owned(), Metric::from(Counter::new()));
        let config = RuntimeTelemetryConfig::new().with_base("jvm").add_set("app", set);

        assert_eq!(config.gc_prefix(), "jvm.gc-mem");
        assert!(format!("{:?}", config).contains(r#"custom_sets: ["app"]"#));
    }
}
