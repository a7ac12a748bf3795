use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Exponential Backoff Retry Strategy
// ============================================================================
//
// Retries an operation while its error is classified as retryable.
// Delay before attempt n+1 is min(max_delay, initial_delay * 2^(n-1)).
// Non-retryable errors and the error of the last attempt are returned as-is.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (first call included)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// Transient store failures (StoreUnavailable)
    pub fn store() -> Self {
        Self::default()
    }

    /// Optimistic-lock conflict loop in the order service
    pub fn version_conflict() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(400),
        }
    }

    /// Pause between failed polls of a Kafka consumer; only the delay
    /// schedule is used, polling never gives up
    pub fn consumer_poll() -> Self {
        Self {
            max_attempts: u32::MAX,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Backoff delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Check if an error is transient (should retry) or permanent (should not retry)
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Execute `operation` until it succeeds, `retryable` rejects the error,
/// or `max_attempts` is reached. The closure receives the 1-based attempt.
pub async fn retry_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                if !retryable(&error) {
                    tracing::debug!(error = %error, "Permanent failure, not retrying");
                    return Err(error);
                }

                if attempt >= config.max_attempts {
                    tracing::error!(
                        attempt = attempt,
                        error = %error,
                        "Operation failed after all retries"
                    );
                    return Err(error);
                }

                let delay = config.delay_for(attempt);
                tracing::warn!(
                    attempt = attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after delay"
                );

                sleep(delay).await;
            }
        }
    }
}

/// Retry with transient error checking
pub async fn retry_on_transient<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    retry_when(config, |e: &E| e.is_transient(), operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    enum TestError {
        Flaky,
        Broken,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl IsTransient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(300),
        };

        assert_eq!(config.delay_for(1), Duration::from_millis(50));
        assert_eq!(config.delay_for(2), Duration::from_millis(100));
        assert_eq!(config.delay_for(3), Duration::from_millis(200));
        assert_eq!(config.delay_for(4), Duration::from_millis(300));
        assert_eq!(config.delay_for(40), Duration::from_millis(300));
    }

    #[test]
    fn test_consumer_poll_backoff_escalates_to_cap() {
        let config = RetryConfig::consumer_poll();

        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(3), Duration::from_millis(400));
        assert_eq!(config.delay_for(1_000), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_on_transient(&fast(), |_attempt| {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TestError::Flaky)
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert!(matches!(result, Ok("success")));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_fails_after_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_on_transient(&fast(), |_attempt| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::Flaky)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Flaky)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_on_transient(&fast(), |_attempt| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::Broken)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Broken)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_predicate_and_attempt_numbers() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let result: Result<(), &str> = retry_when(&fast(), |e| *e == "again", |attempt| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().unwrap().push(attempt);
                Err("again")
            }
        })
        .await;

        assert_eq!(result, Err("again"));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
