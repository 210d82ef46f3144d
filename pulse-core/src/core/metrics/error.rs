use crate::core::metrics::MetricKind;
use thiserror::Error;

/// The result type of metric operations.
pub type Result<T> = std::result::Result<T, MetricError>;

/// The errors that can occur while handling metrics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    /// The metric with the given key couldn't be found.
    #[error("metric {0} not found")]
    NotFound(String),
    /// The metric is missing its identifier.
    #[error("metric id is missing")]
    MissingId,
    /// The metric is missing its type.
    #[error("metric {0} is missing its type")]
    MissingKind(String),
    /// The metric type is not a known metric kind.
    #[error("metric type \"{0}\" is unknown")]
    UnknownKind(String),
    /// The metric doesn't carry the value field required by its kind.
    #[error("metric {0} of type {1} is missing its value")]
    MissingValue(String, MetricKind),
    /// The gauge value is NaN or infinite, which has no wire representation.
    #[error("metric {0} has a non-finite value")]
    NonFinite(String),
    /// The metric carries the value field of another kind.
    #[error("metric {id} of type {expected} carries a {actual} value")]
    KindMismatch {
        id: String,
        expected: MetricKind,
        actual: MetricKind,
    },
}
