use std::io;
use thiserror::Error;

/// The result type of delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// The errors that can occur while delivering metrics to the remote collector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    /// The connection with the remote collector couldn't be established or was lost.
    #[error("failed to connect to the collector, {0}")]
    Connection(String),
    /// The remote collector didn't respond in time.
    #[error("the collector request timed out")]
    Timeout,
    /// An io error occurred while transporting the metrics.
    #[error("an io error occurred, {1}")]
    Io(io::ErrorKind, String),
    /// The remote collector rejected the request with the given status code.
    #[error("the collector responded with status {0}, {1}")]
    Status(u16, String),
    /// The metrics couldn't be encoded into a valid payload.
    #[error("the metrics payload is invalid, {0}")]
    InvalidPayload(String),
    /// The collector address is not a valid base url.
    #[error("invalid collector address {0}")]
    InvalidAddress(String),
    /// The sender has already been closed.
    #[error("the sender has been closed")]
    Closed,
}

impl From<io::Error> for DeliveryError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => DeliveryError::Timeout,
            kind => DeliveryError::Io(kind, err.to_string()),
        }
    }
}

/// The errors that can occur while pushing a batch onto the dispatch queue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// The queue has been closed and no longer accepts batches.
    #[error("the dispatch queue has been closed")]
    Closed,
    /// The push has been abandoned because of a shutdown.
    #[error("the dispatch has been cancelled")]
    Cancelled,
}
