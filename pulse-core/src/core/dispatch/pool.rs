use crate::core::dispatch::{Batch, BatchReceiver, DeliveryError, Transport};
use crate::core::retry::{BackoffStrategy, DefaultErrorClassifier, RetryPolicy, RetryStrategy};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// The default backoff schedule between delivery attempts.
pub const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// The delivery statistics of a [DeliveryPool].
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct DeliveryStats {
    /// The number of batches which have been delivered completely.
    pub delivered: usize,
    /// The number of batches which have been dropped, completely or partially.
    pub dropped: usize,
    /// The number of metrics which never reached the collector.
    pub dropped_metrics: usize,
}

/// The pool of rate-limited delivery workers which consumes the dispatch queue.
///
/// Every batch is delivered by its own task. When a concurrency limit has been configured, the
/// consumer acquires a slot for each batch before its task is spawned, which limits the number of
/// concurrently executing delivery tasks to that limit.
/// A batch which exhausts its retry budget is logged and discarded.
#[derive(Debug, Clone)]
pub struct DeliveryPool {
    inner: Arc<InnerDeliveryPool>,
}

impl DeliveryPool {
    /// Returns a builder for the delivery pool.
    pub fn builder() -> DeliveryPoolBuilder {
        DeliveryPoolBuilder::default()
    }

    /// Consume the given queue until it has been closed, or until the pool is cancelled.
    ///
    /// On cancellation, the queue is closed and batches still waiting within the queue are
    /// discarded. In both cases, this only returns after every in-flight delivery task completed
    /// and the transport has been closed.
    pub async fn run(&self, receiver: BatchReceiver) {
        self.inner.clone().run(receiver).await
    }

    /// Returns the number of delivery tasks which are currently executing.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Relaxed)
    }

    /// Returns the delivery statistics of the pool.
    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            dropped_metrics: self.inner.dropped_metrics.load(Ordering::Relaxed),
        }
    }

    /// Returns the concurrency limit of the pool, `0` meaning unbounded.
    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    /// Stop accepting new batches and wait for the in-flight deliveries.
    pub fn cancel(&self) {
        self.inner.cancellation_token.cancel()
    }
}

/// Builder for the [DeliveryPool].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use pulse_core::core::dispatch::{DeliveryPool, HttpSender, Transport};
///
/// let sender = Arc::new(HttpSender::builder()
///     .address("http://localhost:8080")
///     .build()
///     .unwrap());
/// let pool = DeliveryPool::builder()
///     .transport(Transport::new(sender, true))
///     .concurrency(2)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct DeliveryPoolBuilder {
    transport: Option<Transport>,
    strategy: Option<Arc<dyn RetryStrategy<DeliveryError>>>,
    concurrency: usize,
    cancellation_token: Option<CancellationToken>,
}

impl DeliveryPoolBuilder {
    /// Set the transport used by the delivery tasks.
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the retry strategy of the delivery tasks.
    /// Defaults to the [DEFAULT_BACKOFF] schedule with the [DefaultErrorClassifier].
    pub fn strategy(mut self, strategy: Arc<dyn RetryStrategy<DeliveryError>>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the backoff schedule of the delivery tasks, using the [DefaultErrorClassifier].
    pub fn backoff(self, delays: Vec<Duration>) -> Self {
        self.strategy(Arc::new(BackoffStrategy::new(delays, DefaultErrorClassifier)))
    }

    /// Set the maximum number of concurrent delivery tasks, `0` meaning unbounded.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the cancellation token which shuts the pool down.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the delivery pool.
    ///
    /// # Panics
    ///
    /// Panics if the transport has not been set.
    pub fn build(self) -> DeliveryPool {
        let transport = self.transport.expect("expected a transport to have been set");
        let cancellation_token = self.cancellation_token.unwrap_or_default();
        let strategy = self.strategy.unwrap_or_else(|| {
            Arc::new(BackoffStrategy::new(
                DEFAULT_BACKOFF.to_vec(),
                DefaultErrorClassifier,
            ))
        });
        let policy = RetryPolicy::new(strategy)
            .observe(|e: &DeliveryError, attempt| {
                warn!("Delivery attempt {} failed, {}", attempt, e)
            })
            .cancellation_token(cancellation_token.clone());
        let semaphore = if self.concurrency > 0 {
            Some(Arc::new(Semaphore::new(self.concurrency)))
        } else {
            None
        };

        debug!(
            "Creating delivery pool with {} delivery and concurrency {}",
            transport.mode(),
            self.concurrency
        );
        DeliveryPool {
            inner: Arc::new(InnerDeliveryPool {
                transport,
                policy,
                concurrency: self.concurrency,
                semaphore,
                tracker: TaskTracker::new(),
                in_flight: Default::default(),
                delivered: Default::default(),
                dropped: Default::default(),
                dropped_metrics: Default::default(),
                cancellation_token,
            }),
        }
    }
}

#[derive(Debug)]
struct InnerDeliveryPool {
    transport: Transport,
    policy: RetryPolicy<DeliveryError>,
    concurrency: usize,
    semaphore: Option<Arc<Semaphore>>,
    tracker: TaskTracker,
    in_flight: AtomicUsize,
    delivered: AtomicUsize,
    dropped: AtomicUsize,
    dropped_metrics: AtomicUsize,
    cancellation_token: CancellationToken,
}

impl InnerDeliveryPool {
    async fn run(self: Arc<Self>, mut receiver: BatchReceiver) {
        debug!("Delivery pool consumer has started");
        loop {
            let batch = select! {
                biased;
                _ = self.cancellation_token.cancelled() => break,
                batch = receiver.recv() => match batch {
                    Some(e) => e,
                    None => break,
                },
            };

            let permit = match self.acquire_slot().await {
                Some(permit) => permit,
                None => {
                    warn!("Discarding {}, the delivery pool is shutting down", batch);
                    self.drop_batch(batch.len());
                    break;
                }
            };

            let inner = self.clone();
            self.tracker.spawn(async move {
                inner.deliver(batch).await;
                drop(permit);
            });
        }

        let discarded = receiver.drain();
        if !discarded.is_empty() {
            warn!(
                "Discarding {} queued batches, the delivery pool is shutting down",
                discarded.len()
            );
            for batch in discarded.iter() {
                self.drop_batch(batch.len());
            }
        }

        self.tracker.close();
        trace!(
            "Waiting for {} in-flight delivery tasks to complete",
            self.tracker.len()
        );
        self.tracker.wait().await;
        self.transport.close().await;
        info!(
            "Delivery pool stopped, {} batches delivered, {} dropped",
            self.delivered.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed)
        );
    }

    /// Acquire a delivery slot when the pool has a concurrency limit.
    /// It returns [None] when the pool has been cancelled while waiting for a slot.
    async fn acquire_slot(&self) -> Option<Option<OwnedSemaphorePermit>> {
        match self.semaphore.as_ref() {
            None => Some(None),
            Some(semaphore) => {
                select! {
                    biased;
                    _ = self.cancellation_token.cancelled() => None,
                    permit = semaphore.clone().acquire_owned() => permit.ok().map(Some),
                }
            }
        }
    }

    /// Count a dropped batch and the given number of its metrics which weren't delivered.
    fn drop_batch(&self, metrics: usize) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.dropped_metrics.fetch_add(metrics, Ordering::Relaxed);
    }

    async fn deliver(&self, batch: Batch) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        trace!("Delivering {}", batch);

        match &self.transport {
            Transport::Batch(_, batch_sender) => {
                if batch.is_empty() {
                    trace!("Skipping delivery of empty {}", batch);
                } else {
                    let sender = batch_sender.as_ref();
                    let metrics = batch.metrics();
                    match self
                        .policy
                        .repeat(|| async move { sender.send_batch(metrics).await })
                        .await
                    {
                        Ok(_) => {
                            debug!("Delivered {}", batch);
                            self.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            error!("Dropping {} after failed delivery, {}", batch, e);
                            self.drop_batch(batch.len());
                        }
                    }
                }
            }
            Transport::Single(sender) => {
                let sender = sender.as_ref();
                let mut failures = 0;

                for metric in batch.metrics() {
                    if let Err(e) = self
                        .policy
                        .repeat(|| async move { sender.send(metric).await })
                        .await
                    {
                        error!("Dropping metric {} after failed delivery, {}", metric, e);
                        failures += 1;
                    }
                }

                if failures == 0 {
                    debug!("Delivered {}", batch);
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                } else {
                    warn!("Partially delivered {}, {} metrics dropped", batch, failures);
                    self.drop_batch(failures);
                }
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
