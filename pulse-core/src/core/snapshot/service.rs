use crate::core::metrics::{MetricRegistry, MetricService};
use crate::core::snapshot::{MetricDumper, MetricRestorer, Result};
use log::{debug, error, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// The periodic snapshot task of the collector.
///
/// The complete registry is dumped on every interval tick. A failed dump is logged and the next
/// tick tries again. When the service is shut down, one final dump is executed before the task
/// joins, regardless of the interval.
#[derive(Debug)]
pub struct SnapshotService {
    inner: Arc<InnerSnapshotService>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotService {
    /// Start the snapshot service for the given registry.
    ///
    /// An interval of zero disables the periodic task, only the final dump on shutdown will be
    /// executed.
    pub fn start(
        registry: Arc<MetricRegistry>,
        dumper: Arc<dyn MetricDumper>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        let inner = Arc::new(InnerSnapshotService {
            registry,
            dumper,
            interval,
            cancellation_token,
        });

        let handle = if interval.is_zero() {
            debug!("Periodic snapshots are disabled");
            None
        } else {
            let main_loop = inner.clone();
            Some(tokio::spawn(async move { main_loop.run().await }))
        };

        Self { inner, handle }
    }

    /// Returns the interval of the periodic snapshots.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Dump the current state of the registry immediately.
    pub async fn dump(&self) -> Result<()> {
        self.inner.dump().await
    }

    /// Stop the periodic snapshots, execute the final dump and wait for the task to complete.
    pub async fn shutdown(mut self) {
        self.inner.cancellation_token.cancel();

        match self.handle.take() {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!("Failed to join the snapshot task, {}", e);
                }
            }
            None => self.inner.final_dump().await,
        }
    }
}

#[derive(Debug)]
struct InnerSnapshotService {
    registry: Arc<MetricRegistry>,
    dumper: Arc<dyn MetricDumper>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl InnerSnapshotService {
    async fn run(&self) {
        let mut interval = time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            "Snapshot task started with an interval of {} seconds",
            self.interval.as_secs_f64()
        );

        loop {
            select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.dump().await {
                        error!("Failed to dump metrics snapshot, {}", e);
                    }
                },
            }
        }

        self.final_dump().await;
        debug!("Snapshot task has stopped");
    }

    async fn final_dump(&self) {
        trace!("Executing final metrics snapshot");
        if let Err(e) = self.dump().await {
            error!("Failed to dump final metrics snapshot, {}", e);
        }
    }

    async fn dump(&self) -> Result<()> {
        let metrics = self.registry.snapshot().await;
        self.dumper.dump(metrics.as_slice()).await
    }
}

/// Restore the latest snapshot of the given restorer into the metric service.
/// Every restored metric replaces the stored value instead of being accumulated.
///
/// It returns the number of restored metrics, or the error when the snapshot couldn't be read.
pub async fn restore_snapshot(
    service: &MetricService,
    restorer: &dyn MetricRestorer,
) -> Result<usize> {
    debug!("Restoring metrics snapshot from {:?}", restorer);
    let metrics = restorer.restore().await?;
    Ok(service.restore(metrics).await)
}
