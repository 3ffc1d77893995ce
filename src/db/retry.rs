//! Retry wrapper for transient SQLite contention (`SQLITE_BUSY`/`SQLITE_LOCKED`).
//! Mirrors [`crate::provider::retry`]'s shape for the database layer.

use std::future::Future;
use std::time::Duration;

use rusqlite::ErrorCode;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy)]
pub struct DbRetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for DbRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

fn is_retryable(error: &CoreError) -> bool {
    match error {
        CoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => {
            matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        }
        CoreError::Pool(_) => true,
        _ => false,
    }
}

/// Retry `operation` up to `config.max_attempts` times with exponential
/// backoff, but only for errors `is_retryable` recognizes as transient.
pub async fn retry_db_operation<F, Fut, T>(mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_db_operation_with(DbRetryConfig::default(), &mut operation).await
}

pub async fn retry_db_operation_with<F, Fut, T>(config: DbRetryConfig, operation: &mut F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < config.max_attempts && is_retryable(&e) => {
                let delay = config.base_delay * 2u32.pow(attempt);
                tracing::warn!(attempt, ?delay, error = %e, "retrying database operation");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Same retry policy, for call sites at the application/binary boundary that
/// use `anyhow::Result` instead of [`CoreError`].
pub async fn retry_db_anyhow<F, Fut, T>(mut operation: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_db_operation(&mut operation)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_operation_succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = retry_db_operation(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CoreError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let result = retry_db_operation(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(CoreError::NotFound("x".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
