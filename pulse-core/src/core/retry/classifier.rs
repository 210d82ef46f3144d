use crate::core::dispatch::DeliveryError;
use std::io;

/// Classifies failures as retriable (temporary) or permanent.
pub trait ErrorClassifier<E>: Send + Sync {
    /// Verify if the given error is worth retrying.
    fn is_retriable(&self, err: &E) -> bool;
}

impl<E, F> ErrorClassifier<E> for F
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_retriable(&self, err: &E) -> bool {
        self(err)
    }
}

/// The default error classifier of the delivery pipeline.
///
/// Network level failures and the transport status codes `408`, `429` and `5xx` are retriable.
/// Everything else, such as a malformed payload or a rejected request, is permanent.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct DefaultErrorClassifier;

impl DefaultErrorClassifier {
    /// Verify if the given transport status code is retriable.
    pub fn is_retriable_status(status: u16) -> bool {
        status == 408 || status == 429 || (500..600).contains(&status)
    }
}

impl ErrorClassifier<DeliveryError> for DefaultErrorClassifier {
    fn is_retriable(&self, err: &DeliveryError) -> bool {
        match err {
            DeliveryError::Connection(_) => true,
            DeliveryError::Timeout => true,
            DeliveryError::Io(kind, _) => is_retriable_io_kind(*kind),
            DeliveryError::Status(status, _) => Self::is_retriable_status(*status),
            DeliveryError::InvalidPayload(_) => false,
            DeliveryError::InvalidAddress(_) => false,
            DeliveryError::Closed => false,
        }
    }
}

impl ErrorClassifier<io::Error> for DefaultErrorClassifier {
    fn is_retriable(&self, err: &io::Error) -> bool {
        is_retriable_io_kind(err.kind())
    }
}

fn is_retriable_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Interrupted
    )
}
