//! Exponential-backoff retry for provider HTTP calls. Retries the whole
//! request closure, not individual bytes, so partial reads never get
//! replayed.

use std::future::Future;
use std::time::Duration;

use super::error::ProviderError;

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
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}

pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut backoff = config.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_attempts && err.is_retryable() => {
                tracing::warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    "provider call failed, retrying in {:?}: {}",
                    backoff,
                    err
                );
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let config = RetryConfig::default();
        let result: Result<u32, ProviderError> =
            retry_with_backoff(|| async { Ok(7) }, &config).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let attempts = AtomicU32::new(0);
        let result: Result<u32, ProviderError> = retry_with_backoff(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::StreamError("transient".into()))
                    } else {
                        Ok(42)
                    }
                }
            },
            &config,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let config = RetryConfig::default();
        let attempts = AtomicU32::new(0);
        let result: Result<u32, ProviderError> = retry_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::InvalidApiKey) }
            },
            &config,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
