//! Generic exponential-backoff retry, parameterized over any error type
//! that can say whether it's worth retrying. [`crate::provider::retry`] and
//! [`crate::db::retry`] cover their own call shapes; this is for everything
//! else (tool execution, embedding calls) that wants the same backoff curve
//! without redefining it.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Implemented by an error type to tell the retry loop whether another
/// attempt is worth making.
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

/// Retry `operation` using `RetryableError::is_retryable` to decide whether
/// a failure is worth another attempt.
pub async fn retry<F, Fut, T, E>(operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    retry_with_check(operation, config, E::is_retryable).await
}

/// Retry `operation`, deciding retryability with a caller-supplied
/// predicate instead of a trait impl.
pub async fn retry_with_check<F, Fut, T, E>(
    mut operation: F,
    config: &RetryConfig,
    should_retry: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = config.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_attempts && should_retry(&err) => {
                tracing::warn!(attempt, max_attempts = config.max_attempts, ?backoff, "retrying after failure");
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(
                    Duration::from_secs_f64(backoff.as_secs_f64() * config.backoff_multiplier),
                    config.max_backoff,
                );
            }
            Err(err) => return Err(err),
        }
    }
}
