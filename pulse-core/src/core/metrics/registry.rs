use crate::core::metrics::{Metric, MetricKey, MetricKind, MetricStore, MetricValue, Result};
use log::{debug, trace};

/// The typed metric registry on top of a [MetricStore].
///
/// Counters accumulate the deltas they receive, gauges keep the last received value.
/// Both kinds live in the same store which allows [MetricRegistry::snapshot] to capture all
/// metrics under a single lock.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    store: MetricStore<MetricKey, MetricValue>,
}

impl MetricRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the given metric to the registry.
    ///
    /// A counter adds its delta to the stored total, a gauge replaces the stored value.
    /// It returns the metric as it has been stored.
    pub async fn apply(&self, metric: &Metric) -> Metric {
        let value = match metric.value() {
            MetricValue::Counter(delta) => {
                let delta = *delta;
                self.store
                    .update(metric.key(), |current| {
                        let total = current.and_then(|e| e.as_counter()).unwrap_or(0);
                        MetricValue::Counter(total.wrapping_add(delta))
                    })
                    .await
            }
            MetricValue::Gauge(value) => {
                self.store
                    .set(metric.key(), MetricValue::Gauge(*value))
                    .await;
                MetricValue::Gauge(*value)
            }
        };

        Metric::new(metric.id(), value)
    }

    /// Set the absolute value of the given metric, regardless of its kind.
    /// This never accumulates counter values and is used when restoring persisted state.
    pub async fn set(&self, metric: &Metric) {
        self.store.set(metric.key(), *metric.value()).await;
    }

    /// Increment the counter with the given id by one.
    pub async fn increment(&self, id: &str) -> i64 {
        let value = self.apply(&Metric::counter(id, 1)).await;
        value.value().as_counter().unwrap_or_default()
    }

    /// Find the metric of the given kind and id.
    pub async fn find(&self, kind: MetricKind, id: &str) -> Result<Metric> {
        self.store
            .get(&MetricKey::new(kind, id))
            .await
            .map(|value| Metric::new(id, value))
    }

    /// Reset the metric of the given kind and id by removing it from the registry.
    pub async fn reset(&self, kind: MetricKind, id: &str) {
        if self.store.unset(&MetricKey::new(kind, id)).await.is_some() {
            trace!("Metric {}:{} has been reset", kind, id);
        }
    }

    /// Capture all metrics within the registry.
    /// The returned metrics are ordered by kind and id.
    pub async fn snapshot(&self) -> Vec<Metric> {
        let mut entries = self.store.get_all().await.into_iter().collect::<Vec<_>>();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        debug!("Captured a snapshot of {} metrics", entries.len());
        entries
            .into_iter()
            .map(|(key, value)| Metric::new(key.id, value))
            .collect()
    }

    /// Returns the total number of metrics within the registry.
    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    /// Returns true when the registry doesn't contain any metrics.
    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }
}
