use crate::core::retry::RetryStrategy;
use log::{debug, trace};
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

/// An observer which is invoked for every failed attempt with the error and the attempt number.
pub type ErrorObserver<E> = Arc<dyn Fn(&E, usize) + Send + Sync>;

/// The retry executor which repeats a fallible action according to a [RetryStrategy].
///
/// The policy is cheap to clone and can be shared across tasks.
///
/// # Examples
///
/// ```no_run
/// use std::io;
/// use std::sync::Arc;
/// use std::time::Duration;
/// use pulse_core::core::retry::{BackoffStrategy, DefaultErrorClassifier, RetryPolicy};
///
/// async fn example() -> io::Result<()> {
///     let policy = RetryPolicy::new(Arc::new(BackoffStrategy::new(
///         vec![Duration::from_secs(1), Duration::from_secs(3)],
///         DefaultErrorClassifier,
///     )));
///
///     policy.repeat(|| async { Ok::<(), io::Error>(()) }).await
/// }
/// ```
pub struct RetryPolicy<E> {
    strategy: Arc<dyn RetryStrategy<E>>,
    observers: Vec<ErrorObserver<E>>,
    cancellation_token: Option<CancellationToken>,
}

impl<E> RetryPolicy<E>
where
    E: Display,
{
    /// Create a new retry policy for the given strategy.
    pub fn new(strategy: Arc<dyn RetryStrategy<E>>) -> Self {
        Self {
            strategy,
            observers: Vec::new(),
            cancellation_token: None,
        }
    }

    /// Register an observer which is invoked for every failed attempt.
    pub fn observe<F>(mut self, observer: F) -> Self
    where
        F: Fn(&E, usize) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Interrupt the delay between attempts when the given token is cancelled.
    /// The last error is returned when the delay is interrupted.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Returns the strategy of this policy.
    pub fn strategy(&self) -> &Arc<dyn RetryStrategy<E>> {
        &self.strategy
    }

    /// Repeat the given action until it succeeds, fails with a non-retriable error or runs out of
    /// attempts.
    ///
    /// It returns the first successful result, else the last error of the action.
    pub async fn repeat<T, F, Fut>(&self, mut action: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.strategy.attempts();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let err = match action().await {
                Ok(e) => return Ok(e),
                Err(e) => e,
            };

            for observer in self.observers.iter() {
                observer(&err, attempt);
            }

            if !self.strategy.is_retriable(&err) {
                debug!("Attempt {} failed with a permanent error, {}", attempt, err);
                return Err(err);
            }
            if max_attempts != 0 && attempt >= max_attempts {
                debug!("Giving up after {} attempts, {}", attempt, err);
                return Err(err);
            }

            let delay = self.strategy.delay(attempt);
            trace!(
                "Attempt {} failed, retrying in {} millis",
                attempt,
                delay.as_millis()
            );
            match self.cancellation_token.as_ref() {
                Some(token) => {
                    select! {
                        _ = token.cancelled() => {
                            debug!("Retry has been cancelled after attempt {}", attempt);
                            return Err(err);
                        },
                        _ = time::sleep(delay) => {},
                    }
                }
                None => time::sleep(delay).await,
            }
        }
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
            observers: self.observers.clone(),
            cancellation_token: self.cancellation_token.clone(),
        }
    }
}

impl<E> Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("strategy", &self.strategy)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Repeat the given action with the given strategy without any observers.
pub async fn repeat<T, E, F, Fut>(strategy: Arc<dyn RetryStrategy<E>>, action: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryPolicy::new(strategy).repeat(action).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::DeliveryError;
    use crate::core::retry::{BackoffStrategy, DefaultErrorClassifier};
    use crate::init_logger;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn strategy(attempts: usize) -> Arc<dyn RetryStrategy<DeliveryError>> {
        Arc::new(
            BackoffStrategy::new(
                vec![Duration::from_secs(1), Duration::from_secs(3)],
                DefaultErrorClassifier,
            )
            .with_attempts(attempts),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_exhausts_attempts() {
        init_logger!();
        let invocations = &AtomicUsize::new(0);

        let result: Result<(), DeliveryError> = repeat(strategy(3), || async move {
            invocations.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Timeout)
        })
        .await;

        assert_eq!(Err(DeliveryError::Timeout), result);
        assert_eq!(3, invocations.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_non_retriable() {
        init_logger!();
        let invocations = &AtomicUsize::new(0);

        let result: Result<(), DeliveryError> = repeat(strategy(3), || async move {
            invocations.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Status(400, "bad request".to_string()))
        })
        .await;

        assert_eq!(
            Err(DeliveryError::Status(400, "bad request".to_string())),
            result
        );
        assert_eq!(1, invocations.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_succeeds_after_failures() {
        init_logger!();
        let invocations = &AtomicUsize::new(0);
        let start = Instant::now();

        let result = repeat(strategy(3), || async move {
            let attempt = invocations.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 3 {
                Err(DeliveryError::Connection("connection refused".to_string()))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(Ok(3), result);
        assert!(
            start.elapsed() >= Duration::from_secs(4),
            "expected the backoff schedule to have been respected"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_unbounded() {
        init_logger!();
        let invocations = &AtomicUsize::new(0);

        let result = repeat(strategy(0), || async move {
            let attempt = invocations.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 10 {
                Err(DeliveryError::Timeout)
            } else {
                Ok(())
            }
        })
        .await;

        assert_eq!(Ok(()), result);
        assert_eq!(10, invocations.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_observers() {
        init_logger!();
        let observed = Arc::new(AtomicUsize::new(0));
        let observer_count = observed.clone();
        let policy = RetryPolicy::new(strategy(2)).observe(move |_, _| {
            observer_count.fetch_add(1, Ordering::SeqCst);
        });

        let result: Result<(), DeliveryError> =
            policy.repeat(|| async { Err(DeliveryError::Timeout) }).await;

        assert!(result.is_err(), "expected the last error to be returned");
        assert_eq!(2, observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_repeat_cancelled() {
        init_logger!();
        let token = CancellationToken::new();
        let invocations = &AtomicUsize::new(0);
        let policy = RetryPolicy::new(strategy(0)).cancellation_token(token.clone());
        token.cancel();

        let result: Result<(), DeliveryError> = policy
            .repeat(|| async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err(DeliveryError::Timeout)
            })
            .await;

        assert_eq!(Err(DeliveryError::Timeout), result);
        assert_eq!(1, invocations.load(Ordering::SeqCst));
    }
}
