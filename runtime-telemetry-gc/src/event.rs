use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Usage of one memory pool, in bytes.
///
/// `max` is `-1` when the pool is unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Maximum size of the pool, or `-1` if undefined.
    pub max: i64,
    /// Bytes in use.
    pub used: i64,
}

impl MemoryUsage {
    /// Creates a usage record.
    pub fn new(max: i64, used: i64) -> Self {
        Self { max, used }
    }

    /// `max - used`.
    ///
    /// For unbounded pools this is `-1 - used`; the value is passed through
    /// as is rather than treated as an error.
    // TODO: report unbounded pools as unknown instead of a negative free size.
    pub fn free(&self) -> i64 {
        self.max.wrapping_sub(self.used)
    }
}

/// A single reclamation cycle reported by a collector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GcEvent {
    /// The name of the collector, as reported by the runtime.
    pub collector_name: String,
    /// What the runtime gave as the reason for this cycle, if anything.
    pub cause: Option<String>,
    /// Length of the cycle in milliseconds.
    pub duration_ms: i64,
    /// End of the cycle in milliseconds since the runtime started.
    pub end_time_ms: i64,
    /// Pool usages before the cycle.
    pub before: BTreeMap<String, MemoryUsage>,
    /// Pool usages after the cycle.
    pub after: BTreeMap<String, MemoryUsage>,
}

impl GcEvent {
    /// Creates an event without pool information.
    pub fn new(collector_name: impl Into<String>, duration_ms: i64, end_time_ms: i64) -> Self {
        Self {
            collector_name: collector_name.into(),
            duration_ms,
            end_time_ms,
            ..Default::default()
        }
    }

    /// Adds the usage of `pool` before the cycle.
    #[must_use]
    pub fn with_before(mut self, pool: impl Into<String>, usage: MemoryUsage) -> Self {
        self.before.insert(pool.into(), usage);
        self
    }

    /// Adds the usage of `pool` after the cycle.
    #[must_use]
    pub fn with_after(mut self, pool: impl Into<String>, usage: MemoryUsage) -> Self {
        self.after.insert(pool.into(), usage);
        self
    }

    /// Sets the cause of the cycle.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Encodes this event as the payload of a GC notification.
    pub fn to_payload(&self) -> Value {
        let info = GcNotificationInfo {
            gc_name: self.collector_name.clone(),
            gc_cause: self.cause.clone(),
            gc_info: GcInfo {
                duration: self.duration_ms,
                end_time: self.end_time_ms,
                memory_usage_before_gc: self.before.clone(),
                memory_usage_after_gc: self.after.clone(),
            },
        };
        serde_json::to_value(info).unwrap_or(Value::Null)
    }
}

/// Wire shape of a GC notification payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GcNotificationInfo {
    pub gc_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_cause: Option<String>,
    pub gc_info: GcInfo,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GcInfo {
    pub duration: i64,
    pub end_time: i64,
    #[serde(default)]
    pub memory_usage_before_gc: BTreeMap<String, MemoryUsage>,
    #[serde(default)]
    pub memory_usage_after_gc: BTreeMap<String, MemoryUsage>,
}

impl From<GcNotificationInfo> for GcEvent {
    fn from(info: GcNotificationInfo) -> Self {
        GcEvent {
            collector_name: info.gc_name,
            cause: info.gc_cause,
            duration_ms: info.gc_info.duration,
            end_time_ms: info.gc_info.end_time,
            before: info.gc_info.memory_usage_before_gc,
            after: info.gc_info.memory_usage_after_gc,
        }
    }
}
