use crate::core::dispatch::{Batch, DispatchError};
use log::{debug, trace};
use tokio::select;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

/// The producer side of the bounded dispatch queue between collection and delivery.
///
/// Pushing onto a full queue blocks until the delivery pool picks up a batch, which is the only
/// backpressure point of the pipeline.
/// The queue is closed once every producer handle has been dropped, or when the consumer closes it.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    sender: mpsc::Sender<Batch>,
}

impl DispatchQueue {
    /// Create a new bounded dispatch queue with the given capacity.
    /// A capacity of `0` is treated as a capacity of `1`.
    ///
    /// It returns the producer handle and the consumer of the queue.
    pub fn bounded(capacity: usize) -> (DispatchQueue, BatchReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, BatchReceiver { receiver })
    }

    /// Push the given batch onto the queue.
    /// This waits for a free slot when the queue is full.
    ///
    /// It returns [DispatchError::Cancelled] when the token is cancelled while waiting,
    /// or [DispatchError::Closed] when the consumer is gone.
    pub async fn push(&self, batch: Batch, token: &CancellationToken) -> Result<(), DispatchError> {
        trace!("Pushing {} onto the dispatch queue", batch);
        select! {
            biased;
            _ = token.cancelled() => {
                debug!("Push of {} has been abandoned", batch);
                Err(DispatchError::Cancelled)
            },
            result = self.sender.send(batch.clone()) => result.map_err(|_| DispatchError::Closed),
        }
    }

    /// Returns the maximum number of batches the queue can hold.
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Returns the number of free slots within the queue.
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }

    /// Returns true when the consumer side of the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The consumer side of the [DispatchQueue].
#[derive(Debug)]
pub struct BatchReceiver {
    receiver: mpsc::Receiver<Batch>,
}

impl BatchReceiver {
    /// Receive the next batch from the queue.
    ///
    /// It returns [None] when the queue has been closed and all batches have been received.
    pub async fn recv(&mut self) -> Option<Batch> {
        self.receiver.recv().await
    }

    /// Close the queue to new input.
    /// Batches which have already been queued can still be received.
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Close the queue and remove all batches which are still waiting.
    ///
    /// It returns the batches which have been removed.
    pub fn drain(&mut self) -> Vec<Batch> {
        self.receiver.close();
        let mut batches = vec![];

        loop {
            match self.receiver.try_recv() {
                Ok(batch) => batches.push(batch),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        batches
    }

    /// Returns the number of batches waiting within the queue.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true when no batches are waiting within the queue.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
