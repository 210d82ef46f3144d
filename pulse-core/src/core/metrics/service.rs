use crate::core::metrics::{Metric, MetricDto, MetricKind, MetricRegistry, Result};
use crate::core::snapshot::MetricDumper;
use log::{debug, error, info, trace};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The validated save path of the collector.
///
/// Every live update and every restored entry passes through this service.
/// When a synchronous dumper has been configured, each successful save is followed by a dump of
/// the complete registry. Synchronous dumps are serialized, so a dump always persists a state
/// which is at least as recent as the one of the previous dump.
#[derive(Debug, Clone)]
pub struct MetricService {
    registry: Arc<MetricRegistry>,
    sync_dumper: Option<Arc<dyn MetricDumper>>,
    dump_lock: Arc<Mutex<()>>,
}

impl MetricService {
    /// Create a new metric service for the given registry.
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self {
            registry,
            sync_dumper: None,
            dump_lock: Default::default(),
        }
    }

    /// Dump the registry through the given dumper after every successful save.
    pub fn with_sync_dumper(mut self, dumper: Arc<dyn MetricDumper>) -> Self {
        self.sync_dumper = Some(dumper);
        self
    }

    /// Returns the underlying registry of the service.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Validate and save the given wire metric.
    ///
    /// It returns the stored metric on success, else the validation error.
    pub async fn save_dto(&self, dto: MetricDto) -> Result<Metric> {
        let metric = Metric::try_from(dto)?;
        self.save(metric).await
    }

    /// Validate and save all given wire metrics.
    /// Nothing is saved when one of the metrics is invalid.
    pub async fn save_all_dto(&self, dtos: Vec<MetricDto>) -> Result<Vec<Metric>> {
        let metrics = dtos
            .into_iter()
            .map(Metric::try_from)
            .collect::<Result<Vec<_>>>()?;

        let mut stored = Vec::with_capacity(metrics.len());
        for metric in metrics.iter() {
            stored.push(self.registry.apply(metric).await);
        }
        self.sync_dump().await;

        Ok(stored)
    }

    /// Validate and save the given metric.
    /// Counters are added to the stored total, gauges replace the stored value.
    ///
    /// It returns the stored metric on success, else the validation error.
    pub async fn save(&self, metric: Metric) -> Result<Metric> {
        metric.validate()?;
        trace!("Saving metric {}", metric);
        let stored = self.registry.apply(&metric).await;
        self.sync_dump().await;
        Ok(stored)
    }

    /// Restore the given metrics as absolute values.
    /// Restored counters replace the stored total instead of being added to it.
    ///
    /// It returns the number of restored metrics.
    pub async fn restore(&self, metrics: Vec<Metric>) -> usize {
        for metric in metrics.iter() {
            trace!("Restoring metric {}", metric);
            self.registry.set(metric).await;
        }

        info!("Restored a total of {} metrics", metrics.len());
        metrics.len()
    }

    /// Find the metric of the given kind and id.
    pub async fn find(&self, kind: MetricKind, id: &str) -> Result<Metric> {
        self.registry.find(kind, id).await
    }

    /// Returns all known metrics, ordered by kind and id.
    pub async fn all(&self) -> Vec<Metric> {
        self.registry.snapshot().await
    }

    async fn sync_dump(&self) {
        if let Some(dumper) = self.sync_dumper.as_ref() {
            // the snapshot is taken under the lock, so dumps complete in capture order
            let _guard = self.dump_lock.lock().await;
            let metrics = self.registry.snapshot().await;
            match dumper.dump(metrics.as_slice()).await {
                Ok(_) => debug!("Synchronously dumped {} metrics", metrics.len()),
                Err(e) => error!("Failed to synchronously dump metrics, {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::MetricError;
    use crate::core::snapshot::{MockMetricDumper, SnapshotError};
    use crate::init_logger;
    use crate::testing::{counter, gauge};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn dto(id: &str, kind: &str, delta: Option<i64>, value: Option<f64>) -> MetricDto {
        MetricDto {
            id: id.to_string(),
            kind: kind.to_string(),
            delta,
            value,
        }
    }

    #[tokio::test]
    async fn test_save_dto_counter() {
        init_logger!();
        let service = MetricService::new(Arc::new(MetricRegistry::new()));

        service
            .save_dto(dto("requests", "counter", Some(5), None))
            .await
            .unwrap();
        let result = service
            .save_dto(dto("requests", "counter", Some(7), None))
            .await;

        assert_eq!(Ok(counter("requests", 12)), result);
    }

    #[tokio::test]
    async fn test_save_dto_invalid() {
        init_logger!();
        let service = MetricService::new(Arc::new(MetricRegistry::new()));

        let result = service.save_dto(dto("", "gauge", None, Some(1.0))).await;

        assert_eq!(Err(MetricError::MissingId), result);
        assert!(service.all().await.is_empty(), "expected nothing to be stored");
    }

    #[tokio::test]
    async fn test_save_all_dto_rejects_whole_batch() {
        init_logger!();
        let service = MetricService::new(Arc::new(MetricRegistry::new()));

        let result = service
            .save_all_dto(vec![
                dto("Alloc", "gauge", None, Some(1.0)),
                dto("PollCount", "histogram", Some(1), None),
            ])
            .await;

        assert_eq!(
            Err(MetricError::UnknownKind("histogram".to_string())),
            result
        );
        assert!(service.all().await.is_empty(), "expected nothing to be stored");
    }

    #[tokio::test]
    async fn test_restore_sets_absolute_values() {
        init_logger!();
        let service = MetricService::new(Arc::new(MetricRegistry::new()));
        service.save(counter("PollCount", 3)).await.unwrap();

        let result = service
            .restore(vec![counter("PollCount", 10), gauge("Alloc", 2.5)])
            .await;

        assert_eq!(2, result);
        assert_eq!(
            Ok(counter("PollCount", 10)),
            service.find(MetricKind::Counter, "PollCount").await
        );
        assert_eq!(
            Ok(gauge("Alloc", 2.5)),
            service.find(MetricKind::Gauge, "Alloc").await
        );
    }

    #[tokio::test]
    async fn test_save_sync_dump() {
        init_logger!();
        let invocations = Arc::new(AtomicUsize::new(0));
        let mut dumper = MockMetricDumper::new();
        let dump_invocations = invocations.clone();
        dumper.expect_dump().returning(move |metrics| {
            assert_eq!(1, metrics.len());
            dump_invocations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let service =
            MetricService::new(Arc::new(MetricRegistry::new())).with_sync_dumper(Arc::new(dumper));

        service.save(gauge("Alloc", 1.0)).await.unwrap();

        assert_eq!(1, invocations.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_save_sync_dump_failure_keeps_metric() {
        init_logger!();
        let mut dumper = MockMetricDumper::new();
        dumper
            .expect_dump()
            .returning(|_| Err(SnapshotError::Io("disk full".to_string())));
        let service =
            MetricService::new(Arc::new(MetricRegistry::new())).with_sync_dumper(Arc::new(dumper));

        let result = service.save(counter("requests", 1)).await;

        assert_eq!(Ok(counter("requests", 1)), result);
        assert_eq!(
            Ok(counter("requests", 1)),
            service.find(MetricKind::Counter, "requests").await
        );
    }

    #[tokio::test]
    async fn test_save_non_finite_gauge() {
        init_logger!();
        let mut dumper = MockMetricDumper::new();
        dumper.expect_dump().times(0);
        let service =
            MetricService::new(Arc::new(MetricRegistry::new())).with_sync_dumper(Arc::new(dumper));

        let result = service.save(gauge("CPU", f64::NAN)).await;
        let dto_result = service
            .save_dto(dto("CPU", "gauge", None, Some(f64::INFINITY)))
            .await;

        assert_eq!(Err(MetricError::NonFinite("CPU".to_string())), result);
        assert_eq!(Err(MetricError::NonFinite("CPU".to_string())), dto_result);
        assert!(service.all().await.is_empty(), "expected nothing to be stored");
    }

    /// Dumper which is slow on its first dump and records every dumped state.
    #[derive(Debug, Default)]
    struct SlowFirstDumper {
        invocations: AtomicUsize,
        dumps: std::sync::Mutex<Vec<Vec<Metric>>>,
    }

    #[async_trait]
    impl MetricDumper for SlowFirstDumper {
        async fn dump(&self, metrics: &[Metric]) -> crate::core::snapshot::Result<()> {
            if self.invocations.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.dumps.lock().unwrap().push(metrics.to_vec());
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_saves_dump_in_order() {
        init_logger!();
        let dumper = Arc::new(SlowFirstDumper::default());
        let service =
            MetricService::new(Arc::new(MetricRegistry::new())).with_sync_dumper(dumper.clone());

        let first_service = service.clone();
        let first = tokio::spawn(async move { first_service.save(counter("a", 1)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.save(counter("b", 1)).await.unwrap();
        first.await.unwrap().unwrap();

        let dumps = dumper.dumps.lock().unwrap();
        assert_eq!(2, dumps.len());
        assert_eq!(
            &vec![counter("a", 1), counter("b", 1)],
            dumps.last().unwrap(),
            "expected the last dump to contain every accepted save"
        );
    }
}
