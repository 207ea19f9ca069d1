use thiserror::Error;

use crate::metric::MetricKind;

/// Raised by the [`MetricRegistry`](crate::MetricRegistry) when a name cannot
/// be bound to the requested metric.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The name is already bound to a metric of another kind.
    #[error("metric `{name}` is a {found}, not a {expected}")]
    TypeMismatch {
        /// The metric name that was looked up.
        name: String,
        /// The kind the caller asked for.
        expected: MetricKind,
        /// The kind found (or produced by the factory).
        found: MetricKind,
    },
    /// A strict registration hit a name that is already bound.
    #[error("a metric named `{0}` already exists")]
    AlreadyRegistered(String),
}
