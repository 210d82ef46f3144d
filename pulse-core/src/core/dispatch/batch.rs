use crate::core::metrics::{Metric, MetricKind};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// An immutable, ordered snapshot of metrics captured at a single dump tick.
///
/// The metrics are shared behind an [Arc], which makes cloning a batch cheap and allows it to be
/// handed to concurrent delivery tasks without any locking.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    sequence: u64,
    metrics: Arc<[Metric]>,
}

impl Batch {
    /// Create a new batch with the given sequence number and metrics.
    pub fn new(sequence: u64, metrics: Vec<Metric>) -> Self {
        Self {
            sequence,
            metrics: Arc::from(metrics),
        }
    }

    /// Returns the sequence number of the batch.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the metrics of the batch in their captured order.
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Find the metric of the given kind and id within the batch.
    pub fn find(&self, kind: MetricKind, id: &str) -> Option<&Metric> {
        self.metrics
            .iter()
            .find(|e| e.kind() == kind && e.id() == id)
    }

    /// Returns the number of metrics within the batch.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns true when the batch doesn't contain any metrics.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl Display for Batch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "batch #{} ({} metrics)", self.sequence, self.metrics.len())
    }
}
