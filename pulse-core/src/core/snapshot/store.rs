use crate::core::metrics::{Metric, MetricDto};
use crate::core::snapshot::{Result, SnapshotError};
use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;
use std::fmt::Debug;

/// Persists the complete set of metrics as a durable checkpoint.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait MetricDumper: Debug + Send + Sync {
    /// Persist the given metrics, replacing the previous checkpoint.
    async fn dump(&self, metrics: &[Metric]) -> Result<()>;
}

/// Loads the latest durable checkpoint of metrics.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait MetricRestorer: Debug + Send + Sync {
    /// Read the metrics of the latest checkpoint.
    /// An absent checkpoint results in an empty set.
    async fn restore(&self) -> Result<Vec<Metric>>;
}

/// Validate the given stored entries into metrics.
pub(crate) fn into_metrics(entries: Vec<MetricDto>) -> Result<Vec<Metric>> {
    entries
        .into_iter()
        .map(|e| Metric::try_from(e).map_err(Into::into))
        .collect()
}

/// Verify that every metric of a dump can be persisted.
/// A rejected dump leaves the previous checkpoint untouched.
pub(crate) fn ensure_persistable(metrics: &[Metric]) -> Result<()> {
    metrics
        .iter()
        .try_for_each(|e| e.validate())
        .map_err(|e| SnapshotError::Serialization(e.to_string()))
}
