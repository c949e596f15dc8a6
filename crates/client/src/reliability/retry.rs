//! Retry strategy for idempotent gateway calls

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::backoff::ExponentialBackoff;
use crate::error::{ClientError, Result};

/// Configuration for retry spacing
///
/// Supports exponential backoff with jitter to avoid thundering herd.
///
/// # Example
///
/// ```
/// use jobflow_client::reliability::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_initial_interval(Duration::from_millis(100))
///     .with_max_interval(Duration::from_secs(10));
///
/// // First retry after ~100ms
/// // Second retry after ~160ms
/// // Third retry after ~256ms
/// // etc.
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    #[serde(with = "crate::duration_millis")]
    pub initial_interval: Duration,

    /// Maximum delay between retries
    #[serde(with = "crate::duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier (e.g., 2.0 doubles each delay)
    pub backoff_coefficient: f64,

    /// Jitter factor (0.0-1.0) to add randomness
    ///
    /// A value of 0.1 means ±10% randomness.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(5),
            backoff_coefficient: 1.6,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Set the initial retry interval
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the maximum retry interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the backoff coefficient
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    /// Set the jitter factor (0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Build the backoff supplier described by this policy
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .min_delay(self.initial_interval)
            .max_delay(self.max_interval)
            .backoff_factor(self.backoff_coefficient)
            .jitter_factor(self.jitter)
            .build()
    }
}

/// Attempt-indexed wait time provider; attempts start at 1
pub type WaitTimeProvider = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// How the wait before each retry is computed
pub enum RetryDelay {
    /// Derived from the previous delay
    Backoff(ExponentialBackoff),
    /// Looked up by retry attempt
    Attempt(WaitTimeProvider),
}

impl std::fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backoff(backoff) => f.debug_tuple("Backoff").field(backoff).finish(),
            Self::Attempt(_) => f.debug_tuple("Attempt").finish(),
        }
    }
}

/// Retries an operation for as long as it fails with a transient error
///
/// Transient errors are resource exhaustion and unavailability (see
/// [`ClientError::is_transient`]). Any other error is returned immediately.
/// There is no attempt limit; the loop only ends on success, a non-transient
/// error, or cancellation of the supplied token.
///
/// # Example
///
/// ```ignore
/// let strategy = RetryStrategy::default();
/// let cancel = CancellationToken::new();
///
/// strategy
///     .do_with_retry(|| gateway.complete_job(request.clone()), &cancel)
///     .await?;
/// ```
#[derive(Debug)]
pub struct RetryStrategy {
    delay: RetryDelay,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::with_backoff(ExponentialBackoff::default())
    }
}

impl RetryStrategy {
    pub fn new(delay: RetryDelay) -> Self {
        Self { delay }
    }

    /// Space retries with an exponential backoff supplier
    pub fn with_backoff(backoff: ExponentialBackoff) -> Self {
        Self::new(RetryDelay::Backoff(backoff))
    }

    /// Space retries with an attempt-indexed provider
    pub fn with_wait_provider<F>(provider: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::new(RetryDelay::Attempt(Arc::new(provider)))
    }

    /// Build a strategy from a retry policy
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self::with_backoff(policy.to_backoff())
    }

    /// Wait time before the given retry attempt
    fn delay_for(&self, attempt: u32, previous: Duration) -> Duration {
        match &self.delay {
            RetryDelay::Backoff(backoff) => backoff.next_delay(previous),
            RetryDelay::Attempt(provider) => provider(attempt),
        }
    }

    /// Run `operation`, retrying transient failures
    ///
    /// Returns [`ClientError::Cancelled`] if the token fires before or while
    /// waiting for the next attempt.
    pub async fn do_with_retry<T, F, Fut>(
        &self,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        let mut previous = Duration::ZERO;

        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            attempt = attempt.saturating_add(1);
            let delay = self.delay_for(attempt, previous);
            previous = delay;

            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient gateway error, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tonic::Code;

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial_interval, Duration::from_millis(50));
        assert_eq!(policy.max_interval, Duration::from_secs(5));
        assert_eq!(policy.backoff_coefficient, 1.6);
        assert_eq!(policy.jitter, 0.1);
    }

    #[test]
    fn test_policy_to_backoff() {
        let policy = RetryPolicy::default()
            .with_initial_interval(Duration::from_millis(100))
            .with_jitter(0.0);

        let backoff = policy.to_backoff();
        assert_eq!(backoff.next_delay(Duration::ZERO), Duration::from_millis(100));
        assert_eq!(backoff.max_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_serialization() {
        let policy = RetryPolicy::default().with_backoff_coefficient(2.0);

        let json = serde_json::to_string(&policy).unwrap();
        let parsed: RetryPolicy = serde_json::from_str(&json).unwrap();

        assert_eq!(policy, parsed);
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let attempts_seen = Arc::new(Mutex::new(Vec::new()));
        let seen = attempts_seen.clone();
        let strategy = RetryStrategy::with_wait_provider(move |attempt| {
            seen.lock().push(attempt);
            Duration::from_millis(1)
        });

        let calls = AtomicUsize::new(0);
        let result = strategy
            .do_with_retry(
                || {
                    let call = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if call < 3 {
                            Err(ClientError::rpc(Code::ResourceExhausted, "overloaded"))
                        } else {
                            Ok("done")
                        }
                    }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(*attempts_seen.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let strategy = RetryStrategy::with_wait_provider(|_| Duration::from_millis(1));

        let calls = AtomicUsize::new(0);
        let err = strategy
            .do_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(ClientError::rpc(Code::NotFound, "no such job")) }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(Code::NotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff() {
        let strategy = RetryStrategy::with_wait_provider(|_| Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let calls = AtomicUsize::new(0);
        let err = strategy
            .do_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(ClientError::rpc(Code::Unavailable, "down")) }
                },
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_delay_uses_previous_delay() {
        let strategy = RetryStrategy::with_backoff(
            ExponentialBackoff::builder()
                .min_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(4))
                .backoff_factor(2.0)
                .jitter_factor(0.0)
                .build(),
        );

        assert_eq!(strategy.delay_for(1, Duration::ZERO), Duration::from_millis(1));
        assert_eq!(
            strategy.delay_for(2, Duration::from_millis(1)),
            Duration::from_millis(2)
        );
        assert_eq!(
            strategy.delay_for(5, Duration::from_millis(4)),
            Duration::from_millis(4)
        );
    }
}
