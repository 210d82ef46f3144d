use crate::core::config::CollectorProperties;
use crate::core::metrics::{MetricRegistry, MetricService};
use crate::core::snapshot::{restore_snapshot, Result, SnapshotBackend, SnapshotService};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The collector side of Pulse, which owns the metric registry and its durable snapshots.
///
/// The collector exposes the [MetricService] as the validated save path for the update
/// handlers of the embedding application.
#[derive(Debug)]
pub struct Collector {
    service: MetricService,
    backend: SnapshotBackend,
    snapshots: SnapshotService,
}

impl Collector {
    /// Start the collector for the given properties.
    ///
    /// The snapshot backend is selected from the properties, after which the latest snapshot is
    /// restored when enabled. A snapshot which cannot be restored fails the startup.
    pub async fn start(properties: &CollectorProperties) -> Result<Self> {
        Self::start_with_token(properties, CancellationToken::new()).await
    }

    /// Start the collector with a parent cancellation token.
    /// Cancelling the token stops the periodic snapshots, [Collector::shutdown] still needs to be
    /// invoked to await the final snapshot.
    pub async fn start_with_token(
        properties: &CollectorProperties,
        cancellation_token: CancellationToken,
    ) -> Result<Self> {
        let backend = SnapshotBackend::from_properties(properties)?;
        let registry = Arc::new(MetricRegistry::new());
        let mut service = MetricService::new(registry.clone());

        if properties.restore {
            restore_snapshot(&service, backend.restorer().as_ref()).await?;
        } else {
            debug!("Snapshot restore is disabled");
        }

        let interval = if properties.is_sync_store() {
            debug!("Using synchronous snapshots on every save");
            service = service.with_sync_dumper(backend.dumper());
            Duration::ZERO
        } else {
            properties.store_interval()
        };
        let snapshots = SnapshotService::start(
            registry,
            backend.dumper(),
            interval,
            cancellation_token.child_token(),
        );

        info!("Collector started with snapshot backend {}", backend);
        Ok(Self {
            service,
            backend,
            snapshots,
        })
    }

    /// Returns the validated save path of the collector.
    pub fn service(&self) -> &MetricService {
        &self.service
    }

    /// Returns the snapshot backend of the collector.
    pub fn backend(&self) -> &SnapshotBackend {
        &self.backend
    }

    /// Dump the current state of the collector immediately.
    pub async fn snapshot(&self) -> Result<()> {
        self.snapshots.dump().await
    }

    /// Stop the periodic snapshots, execute the final snapshot and wait for it to complete.
    pub async fn shutdown(self) {
        debug!("Shutting down collector");
        self.snapshots.shutdown().await;
        info!("Collector has been stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::{MetricDto, MetricError, MetricKind};
    use crate::core::snapshot::SnapshotError;
    use crate::init_logger;
    use crate::testing::{counter, gauge};
    use std::fs;
    use tempfile::tempdir;

    fn file_properties(path: &std::path::Path, store_interval: u64) -> CollectorProperties {
        CollectorProperties {
            store_interval,
            file_storage_path: path.to_str().unwrap().to_string(),
            database_dsn: None,
            restore: true,
        }
    }

    #[tokio::test]
    async fn test_restart_restores_state() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let properties = file_properties(&temp_dir.path().join("metrics-db.json"), 300);

        let collector = Collector::start(&properties).await.unwrap();
        collector.service().save(counter("requests", 5)).await.unwrap();
        collector.service().save(counter("requests", 7)).await.unwrap();
        collector.service().save(gauge("Alloc", 1.0)).await.unwrap();
        collector.service().save(gauge("Alloc", 2.0)).await.unwrap();
        collector.shutdown().await;

        let collector = Collector::start(&properties).await.unwrap();
        let result = collector.service().all().await;
        collector.shutdown().await;

        assert_eq!(vec![counter("requests", 12), gauge("Alloc", 2.0)], result);
    }

    #[tokio::test]
    async fn test_sync_store() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("metrics-db.json");
        let collector = Collector::start(&file_properties(&path, 0)).await.unwrap();

        collector
            .service()
            .save_dto(MetricDto {
                id: "PollCount".to_string(),
                kind: "counter".to_string(),
                delta: Some(3),
                value: None,
            })
            .await
            .unwrap();

        let entries: Vec<MetricDto> =
            serde_json::from_str(fs::read_to_string(&path).unwrap().as_str()).unwrap();
        assert_eq!(1, entries.len());
        assert_eq!(Some(3), entries[0].delta);
        collector.shutdown().await;
    }

    #[tokio::test]
    async fn test_restore_disabled() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("metrics-db.json");
        fs::write(&path, r#"[{"id": "Alloc", "type": "gauge", "value": 4.0}]"#).unwrap();
        let properties = CollectorProperties {
            restore: false,
            ..file_properties(&path, 300)
        };

        let collector = Collector::start(&properties).await.unwrap();

        assert!(
            collector
                .service()
                .find(MetricKind::Gauge, "Alloc")
                .await
                .is_err(),
            "expected the snapshot to not have been restored"
        );
        collector.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_invalid_snapshot() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("metrics-db.json");
        fs::write(&path, "lorem ipsum").unwrap();

        let result = Collector::start(&file_properties(&path, 300)).await;

        assert!(
            matches!(result, Err(SnapshotError::Serialization(_))),
            "expected SnapshotError::Serialization, got {:?}",
            result.map(|_| ())
        );
    }

    #[tokio::test]
    async fn test_database_backend() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let properties = CollectorProperties {
            database_dsn: Some(temp_dir.path().join("metrics.db").to_str().unwrap().to_string()),
            ..file_properties(&temp_dir.path().join("unused.json"), 300)
        };

        let collector = Collector::start(&properties).await.unwrap();
        collector.service().save(gauge("Alloc", 8.0)).await.unwrap();
        collector.snapshot().await.unwrap();
        collector.shutdown().await;
        let collector = Collector::start(&properties).await.unwrap();

        assert!(
            matches!(collector.backend(), SnapshotBackend::Database(_)),
            "expected the database backend"
        );
        assert_eq!(
            Ok(gauge("Alloc", 8.0)),
            collector.service().find(MetricKind::Gauge, "Alloc").await
        );
        assert!(
            !temp_dir.path().join("unused.json").exists(),
            "expected the file backend to not have been used"
        );
        collector.shutdown().await;
    }

    #[tokio::test]
    async fn test_non_finite_gauge_doesnt_break_restart() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let properties = file_properties(&temp_dir.path().join("metrics-db.json"), 0);

        let collector = Collector::start(&properties).await.unwrap();
        collector.service().save(gauge("Alloc", 4.0)).await.unwrap();
        let result = collector.service().save(gauge("CPU", f64::NAN)).await;
        collector.shutdown().await;
        let collector = Collector::start(&properties).await.unwrap();
        let restored = collector.service().all().await;
        collector.shutdown().await;

        assert_eq!(Err(MetricError::NonFinite("CPU".to_string())), result);
        assert_eq!(vec![gauge("Alloc", 4.0)], restored);
    }
}
