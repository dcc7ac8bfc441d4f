//! Retry helper for calls to external services

use std::fmt::Display;
use std::future::Future;
use tokio::time::{Duration, sleep};

/// Upper bound on attempts (first call included)
pub const MAX_ATTEMPTS: u32 = 3;

const BASE_DELAY_MS: u64 = 200;

/// Retry an async operation on transient errors with exponential backoff.
///
/// Makes at most `max_attempts` calls, sleeping 200ms, 400ms, 800ms... between
/// them. Errors for which `is_retryable` returns false are returned
/// immediately without retrying.
pub async fn with_retry<T, E, F, Fut, R>(
    label: &str,
    max_attempts: u32,
    mut make_call: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match make_call().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay_ms = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                log::warn!(
                    "{}: {}, retrying in {}ms (attempt {}/{})",
                    label,
                    e,
                    delay_ms,
                    attempt + 1,
                    max_attempts
                );
                sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_errors_up_to_cap() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = with_retry(
            "test",
            MAX_ATTEMPTS,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("connection reset".to_string()) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("connection reset".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = with_retry(
            "test",
            MAX_ATTEMPTS,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("unsupported".to_string()) }
            },
            |_| false,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = with_retry(
            "test",
            MAX_ATTEMPTS,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 2 {
                        Err(format!("attempt {} failed", n))
                    } else {
                        Ok(n)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_backoff_grows_between_attempts() {
        let started = std::time::Instant::now();

        let _: Result<(), String> =
            with_retry("test", 3, || async { Err("busy".to_string()) }, |_| true).await;

        // 200ms + 400ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(600));
    }
}
