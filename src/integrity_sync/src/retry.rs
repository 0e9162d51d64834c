//! Classified retry with exponential backoff.
//!
//! [`RetryPolicy::execute`] is the only place in the crate that decides
//! whether a failed remote call is worth repeating. The decision is made on
//! [`ErrorCode`] alone: authorization and validation failures are returned at
//! once, everything else is retried with `base * multiplier^(attempt - 1)`
//! between attempts.

use std::future::Future;
use std::time::{Duration, Instant};

use store_gateway::{ErrorCode, StoreError};
use tracing::warn;

use crate::metrics::MetricsMonitor;

/// Retry budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Factor applied after each further failure.
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2,
        }
    }
}

/// `false` for failures that repeating the same request cannot fix.
pub fn is_retryable(err: &StoreError) -> bool {
    !matches!(
        err.code(),
        ErrorCode::PermissionDenied | ErrorCode::InvalidArgument
    )
}

impl RetryPolicy {
    /// Sleep before attempt `attempt + 1`, given that attempt `attempt` (1-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable code, or the
    /// attempt budget is spent. Returns the last error in the latter cases.
    ///
    /// `what` names the operation in log lines.
    pub async fn execute<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) || attempt >= max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = what,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        code = %err.code(),
                        error = %err,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Awaits `fut` and records its latency and outcome with `metrics`.
pub async fn timed<T, Fut>(metrics: &MetricsMonitor, fut: Fut) -> Result<T, StoreError>
where
    Fut: Future<Output = Result<T, StoreError>>,
{
    let started = Instant::now();
    let result = fut.await;
    metrics.record_operation(started.elapsed(), result.is_ok());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing(code: ErrorCode) -> StoreError {
        StoreError::remote("test", code, "boom")
    }

    #[test]
    fn delays_double_from_the_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for(200) >= policy.delay_for(20));
    }

    #[test]
    fn only_auth_and_validation_failures_are_final() {
        assert!(!is_retryable(&failing(ErrorCode::PermissionDenied)));
        assert!(!is_retryable(&failing(ErrorCode::InvalidArgument)));
        assert!(is_retryable(&failing(ErrorCode::Unavailable)));
        assert!(is_retryable(&failing(ErrorCode::NotFound)));
        assert!(is_retryable(&failing(ErrorCode::Unknown)));
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = tokio::time::Instant::now();

        let err = RetryPolicy::default()
            .execute("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(failing(ErrorCode::PermissionDenied))
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_back_off_then_give_up() {
        let log = std::sync::Mutex::new(Vec::new());
        let stamps = &log;

        let err = RetryPolicy::default()
            .execute("op", move || async move {
                stamps.lock().unwrap().push(tokio::time::Instant::now());
                Err::<(), _>(failing(ErrorCode::Unavailable))
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Unavailable);
        let stamps = log.into_inner().unwrap();
        assert_eq!(stamps.len(), 3);
        assert_eq!(stamps[1] - stamps[0], Duration::from_millis(100));
        assert_eq!(stamps[2] - stamps[1], Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_when_a_later_attempt_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let value = RetryPolicy::default()
            .execute("op", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(failing(ErrorCode::ResourceExhausted))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
