use crate::core::dispatch::Result;
use crate::core::metrics::Metric;
use async_trait::async_trait;
use derive_more::Display;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;
use std::fmt::Debug;
use std::sync::Arc;

/// A sender transports single metrics to the remote collector.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait Sender: Debug + Send + Sync {
    /// Send the given metric to the remote collector.
    async fn send(&self, metric: &Metric) -> Result<()>;

    /// Close the sender, releasing any underlying resources.
    /// Sending after the sender has been closed fails with [crate::core::dispatch::DeliveryError::Closed].
    async fn close(&self);
}

/// The optional capability of a sender to transport multiple metrics within a single call.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait BatchSender: Debug + Send + Sync {
    /// Send all given metrics, in order, to the remote collector within a single call.
    async fn send_batch(&self, metrics: &[Metric]) -> Result<()>;
}

/// The delivery mode of a [Transport].
#[derive(Debug, Display, Copy, Clone, PartialEq)]
pub enum DeliveryMode {
    /// Each batch is delivered within a single call.
    #[display("batch")]
    Batch,
    /// The metrics of a batch are delivered one by one, in batch order.
    #[display("sequential")]
    Sequential,
}

/// The transport through which delivery tasks reach the remote collector.
///
/// The delivery mode is decided once, when the transport is created, based on the capabilities
/// of the given sender.
#[derive(Debug, Clone)]
pub enum Transport {
    /// A sender which can only deliver single metrics.
    Single(Arc<dyn Sender>),
    /// A sender which can also deliver complete batches.
    Batch(Arc<dyn Sender>, Arc<dyn BatchSender>),
}

impl Transport {
    /// Create a transport which delivers metrics one by one.
    pub fn single<S>(sender: Arc<S>) -> Self
    where
        S: Sender + 'static,
    {
        Transport::Single(sender)
    }

    /// Create a transport which delivers complete batches.
    pub fn batch<S>(sender: Arc<S>) -> Self
    where
        S: Sender + BatchSender + 'static,
    {
        Transport::Batch(sender.clone(), sender)
    }

    /// Create a transport for a batch capable sender, which only uses the batch capability
    /// when `batch_enabled` is true.
    pub fn new<S>(sender: Arc<S>, batch_enabled: bool) -> Self
    where
        S: Sender + BatchSender + 'static,
    {
        if batch_enabled {
            Self::batch(sender)
        } else {
            Self::single(sender)
        }
    }

    /// Returns the delivery mode of the transport.
    pub fn mode(&self) -> DeliveryMode {
        match self {
            Transport::Single(_) => DeliveryMode::Sequential,
            Transport::Batch(_, _) => DeliveryMode::Batch,
        }
    }

    /// Returns the single metric sender of the transport.
    pub fn sender(&self) -> &Arc<dyn Sender> {
        match self {
            Transport::Single(sender) => sender,
            Transport::Batch(sender, _) => sender,
        }
    }

    /// Returns the batch sender of the transport, if the transport delivers batches.
    pub fn batch_sender(&self) -> Option<&Arc<dyn BatchSender>> {
        match self {
            Transport::Single(_) => None,
            Transport::Batch(_, batch_sender) => Some(batch_sender),
        }
    }

    /// Close the underlying sender.
    pub async fn close(&self) {
        self.sender().close().await
    }
}
