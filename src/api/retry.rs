//! Bounded exponential-backoff retry
//!
//! `RetryPolicy` is an explicit object wrapping a fallible async operation.
//! Classification is delegated to [`ApiError::is_retryable`]; a terminal
//! error surfaces on its first occurrence.

use crate::api::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay inserted before the given 1-based attempt. No delay before the
    /// first; doubles for every attempt after the second.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.base_delay * 2u32.saturating_pow(attempt - 2)
        }
    }

    /// Run `operation` until it succeeds, a terminal error occurs, or the
    /// retry budget (`max_retries` retries, so `max_retries + 1` attempts)
    /// is exhausted. The last error is returned as-is.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let total_attempts = self.max_retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let delay = self.backoff_delay(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= total_attempts => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        "attempt {}/{} failed, retrying: {}",
                        attempt,
                        total_attempts,
                        err
                    );

                    // Honor Retry-After when the server asks for a longer
                    // wait than the computed backoff.
                    if let Some(requested) = err.retry_after() {
                        let next = self.backoff_delay(attempt + 1);
                        if requested > next {
                            sleep(requested - next).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn server_error() -> ApiError {
        ApiError::Server {
            status: 503,
            body: String::new(),
        }
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(1), Duration::ZERO);
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget_on_transient_errors() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let started = tokio::time::Instant::now();
        let result: Result<(), _> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(server_error())
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Server { status: 503, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        // 100ms + 200ms + 400ms of backoff across the three retries
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_makes_single_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::Client {
                        status: 404,
                        body: "not found".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Client { status: 404, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_then_success_takes_one_retry() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ApiError::Throttled {
                            retry_after: None,
                            body: String::new(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_extends_backoff() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let started = tokio::time::Instant::now();
        let result = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ApiError::Throttled {
                            retry_after: Some(3),
                            body: String::new(),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        // Server asked for 3s, which dominates the 100ms backoff.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(100));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(server_error())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
