use crate::core::metrics::MetricError;
use std::io;
use thiserror::Error;

/// The result type of snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// The errors that can occur while dumping or restoring a metrics snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    /// The snapshot file couldn't be read or written.
    #[error("snapshot io error, {0}")]
    Io(String),
    /// The snapshot couldn't be encoded or decoded.
    #[error("failed to (de)serialize the snapshot, {0}")]
    Serialization(String),
    /// The snapshot database operation failed.
    #[error("snapshot database error, {0}")]
    Database(String),
    /// The snapshot contains an entry which is not a valid metric.
    #[error("the snapshot contains an invalid metric, {0}")]
    InvalidMetric(String),
}

impl From<io::Error> for SnapshotError {
    fn from(err: io::Error) -> Self {
        SnapshotError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for SnapshotError {
    fn from(err: rusqlite::Error) -> Self {
        SnapshotError::Database(err.to_string())
    }
}

impl From<MetricError> for SnapshotError {
    fn from(err: MetricError) -> Self {
        SnapshotError::InvalidMetric(err.to_string())
    }
}
