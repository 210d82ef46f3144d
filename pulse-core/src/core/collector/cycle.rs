use crate::core::collector::MetricSource;
use crate::core::dispatch::{Batch, DispatchError, DispatchQueue};
use crate::core::metrics::{MetricKind, MetricRegistry};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// The cycle-scoped counter which counts the poll ticks between two reports.
pub const POLL_COUNT: &str = "PollCount";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// The collection cycle of the agent.
///
/// The cycle runs two periodic triggers within a single task. The poll tick refreshes the
/// readings of all sources into the registry and increments the [POLL_COUNT] counter. The report
/// tick captures the registry into a [Batch], pushes it onto the dispatch queue and resets the
/// [POLL_COUNT] counter once the batch has been accepted.
///
/// Pushing onto a full queue suspends the cycle, which pauses the polling as well.
#[derive(Debug)]
pub struct CollectionCycle {
    registry: Arc<MetricRegistry>,
    sources: Vec<Box<dyn MetricSource>>,
    poll_interval: Duration,
    report_interval: Duration,
    queue: DispatchQueue,
    sequence: AtomicU64,
    cancellation_token: CancellationToken,
}

impl CollectionCycle {
    /// Returns a builder for the collection cycle.
    pub fn builder() -> CollectionCycleBuilder {
        CollectionCycleBuilder::default()
    }

    /// Returns the registry into which the readings are collected.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Run the collection cycle until it's cancelled or the dispatch queue has been closed.
    pub async fn run(&self) {
        let mut poll = time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report =
            time::interval_at(Instant::now() + self.report_interval, self.report_interval);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            "Collection cycle started, polling every {} millis and reporting every {} millis",
            self.poll_interval.as_millis(),
            self.report_interval.as_millis()
        );

        loop {
            select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = poll.tick() => self.poll().await,
                _ = report.tick() => {
                    match self.report().await {
                        Ok(_) => {}
                        Err(DispatchError::Cancelled) => break,
                        Err(DispatchError::Closed) => {
                            warn!("Dispatch queue has been closed, stopping collection cycle");
                            break;
                        }
                    }
                },
            }
        }

        debug!("Collection cycle has stopped");
    }

    /// Refresh the readings of all sources into the registry.
    /// A failing source is logged and skipped.
    pub async fn poll(&self) {
        for source in self.sources.iter() {
            match source.collect().await {
                Ok(metrics) => {
                    for metric in metrics.iter() {
                        match metric.validate() {
                            Ok(_) => {
                                self.registry.apply(metric).await;
                            }
                            Err(e) => warn!("Skipping reading {}, {}", metric, e),
                        }
                    }
                }
                Err(e) => warn!("Failed to collect metrics, {}", e),
            }
        }

        let poll_count = self.registry.increment(POLL_COUNT).await;
        trace!("Poll tick {} completed", poll_count);
    }

    /// Capture the registry into a batch and push it onto the dispatch queue.
    /// The [POLL_COUNT] counter is only reset when the queue accepted the batch.
    pub async fn report(&self) -> Result<(), DispatchError> {
        let metrics = self.registry.snapshot().await;
        let batch = Batch::new(self.sequence.fetch_add(1, Ordering::Relaxed), metrics);

        self.queue.push(batch.clone(), &self.cancellation_token).await?;
        self.registry.reset(MetricKind::Counter, POLL_COUNT).await;
        debug!("Queued {} for delivery", batch);
        Ok(())
    }
}

/// Builder for the [CollectionCycle].
#[derive(Debug, Default)]
pub struct CollectionCycleBuilder {
    registry: Option<Arc<MetricRegistry>>,
    sources: Vec<Box<dyn MetricSource>>,
    poll_interval: Option<Duration>,
    report_interval: Option<Duration>,
    queue: Option<DispatchQueue>,
    cancellation_token: Option<CancellationToken>,
}

impl CollectionCycleBuilder {
    /// Set the registry into which the readings are collected.
    pub fn registry(mut self, registry: Arc<MetricRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a metric source to the cycle.
    pub fn source(mut self, source: Box<dyn MetricSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Set the interval of the poll tick.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the interval of the report tick.
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    /// Set the dispatch queue onto which the batches are pushed.
    pub fn queue(mut self, queue: DispatchQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Set the cancellation token of the cycle.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the collection cycle.
    ///
    /// # Panics
    ///
    /// Panics if the dispatch queue has not been set.
    pub fn build(self) -> CollectionCycle {
        let queue = self.queue.expect("expected a dispatch queue to have been set");
        let poll_interval = non_zero(self.poll_interval, DEFAULT_POLL_INTERVAL);
        let report_interval = non_zero(self.report_interval, DEFAULT_REPORT_INTERVAL);

        CollectionCycle {
            registry: self.registry.unwrap_or_default(),
            sources: self.sources,
            poll_interval,
            report_interval,
            queue,
            sequence: AtomicU64::new(1),
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        }
    }
}

fn non_zero(interval: Option<Duration>, default: Duration) -> Duration {
    interval.filter(|e| !e.is_zero()).unwrap_or(default)
}
