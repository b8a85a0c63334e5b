//! Timeouts and bounded retries around storage calls.
//!
//! - Writes get a timeout only. A write that timed out may still have
//!   committed, so it is never replayed.
//! - Reads get a timeout per attempt and are retried on transient failures
//!   with exponential backoff: `base * 2^(attempt - 1)`.

use std::future::Future;
use std::time::Duration;

use crate::db::RepositoryError;

/// Default delay before the first read retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Timeout and retry settings applied by every service.
#[derive(Debug, Clone, Copy)]
pub struct StoragePolicy {
    pub timeout: Duration,
    /// Total attempts for reads, first try included. At least 1.
    pub read_attempts: u32,
    pub backoff_base: Duration,
}

impl StoragePolicy {
    #[must_use]
    pub fn new(timeout: Duration, read_attempts: u32) -> Self {
        Self {
            timeout,
            read_attempts: read_attempts.max(1),
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Run one storage call under the timeout.
    ///
    /// # Errors
    ///
    /// Returns the call's error, or [`RepositoryError::Timeout`].
    pub async fn write<T, F>(&self, call: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| RepositoryError::Timeout(self.timeout))?
    }

    /// Run a read, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-transient error.
    pub async fn read<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match self.write(call()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.read_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        error = %e,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Storage read failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(attempts: u32) -> StoragePolicy {
        StoragePolicy {
            timeout: Duration::from_millis(200),
            read_attempts: attempts,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let p = StoragePolicy::new(Duration::from_secs(5), 3);
        assert_eq!(p.backoff(1), Duration::from_millis(50));
        assert_eq!(p.backoff(2), Duration::from_millis(100));
        assert_eq!(p.backoff(3), Duration::from_millis(200));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(StoragePolicy::new(Duration::from_secs(1), 0).read_attempts, 1);
    }

    #[tokio::test]
    async fn test_write_times_out() {
        let result: Result<(), _> = policy(1)
            .write(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(RepositoryError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_read_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let value = policy(3)
            .read("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_read_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(2)
            .read("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(3)
            .read("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RepositoryError::NotFound)
            })
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
