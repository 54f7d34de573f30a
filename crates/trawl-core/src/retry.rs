use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Bounded retry with exponential backoff.
///
/// Delay before the retry that follows attempt `i` (0-based) is
/// `base_delay * 2^i`: with the defaults that is 2s, then 4s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff after the given 0-based attempt.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

/// Information handed to the `on_retry` hook before sleeping.
#[derive(Debug)]
pub struct RetryNotice<'a> {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: &'a AppError,
}

/// Run `op` until it succeeds, the attempt budget is spent, or it returns an
/// error `is_retryable` rejects. The last error is returned unchanged.
pub async fn retry_with_backoff<T, Op, Fut, P, H>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut on_retry: H,
    mut op: Op,
) -> Result<T, AppError>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
    P: Fn(&AppError) -> bool,
    H: FnMut(RetryNotice<'_>),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op(attempt + 1).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt + 1 >= max_attempts || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = policy.delay_after_attempt(attempt);
                on_retry(RetryNotice {
                    attempt: attempt + 1,
                    max_attempts,
                    delay,
                    error: &e,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
