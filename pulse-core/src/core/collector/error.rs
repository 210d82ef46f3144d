use thiserror::Error;

/// The result type of the metric collection.
pub type Result<T> = std::result::Result<T, CollectError>;

/// The errors that can occur while collecting live readings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectError {
    /// The readings of the source are currently unavailable.
    #[error("metric source {0} is unavailable, {1}")]
    Unavailable(String, String),
}
