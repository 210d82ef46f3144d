use crate::core::retry::ErrorClassifier;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// A pluggable retry strategy which decides how often, and after which delay, a failed action
/// is retried.
pub trait RetryStrategy<E>: Debug + Send + Sync {
    /// Returns the maximum number of attempts, including the first one.
    /// A value of `0` means the action is retried until it succeeds or fails permanently.
    fn attempts(&self) -> usize;

    /// Returns the delay to wait after the given failed attempt.
    /// Attempts are counted from `1`.
    fn delay(&self, attempt: usize) -> Duration;

    /// Verify if the given error can be retried.
    fn is_retriable(&self, err: &E) -> bool;
}

/// A retry strategy with a fixed backoff schedule.
///
/// The delay after attempt `n` is the `n`-th entry of the schedule, or no delay at all when the
/// schedule is shorter than the number of attempts.
/// By default, the strategy allows one attempt more than there are delays within the schedule.
pub struct BackoffStrategy<C> {
    delays: Vec<Duration>,
    attempts: usize,
    classifier: C,
}

impl<C> BackoffStrategy<C> {
    /// Create a new backoff strategy for the given schedule and error classifier.
    pub fn new(delays: Vec<Duration>, classifier: C) -> Self {
        let attempts = delays.len() + 1;
        Self {
            delays,
            attempts,
            classifier,
        }
    }

    /// Override the maximum number of attempts of the strategy.
    /// Use `0` to retry without a bound.
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Returns the backoff schedule of the strategy.
    pub fn delays(&self) -> &[Duration] {
        self.delays.as_slice()
    }
}

impl<E, C> RetryStrategy<E> for BackoffStrategy<C>
where
    C: ErrorClassifier<E>,
{
    fn attempts(&self) -> usize {
        self.attempts
    }

    fn delay(&self, attempt: usize) -> Duration {
        attempt
            .checked_sub(1)
            .and_then(|index| self.delays.get(index))
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    fn is_retriable(&self, err: &E) -> bool {
        self.classifier.is_retriable(err)
    }
}

impl<C> Debug for BackoffStrategy<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffStrategy")
            .field("delays", &self.delays)
            .field("attempts", &self.attempts)
            .finish()
    }
}
