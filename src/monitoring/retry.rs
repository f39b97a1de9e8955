//! Bounded retry with backoff

use std::future::Future;
use std::time::Duration;

/// Configuration for retry logic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Linear backoff step; the wait after attempt `n` is `step * n`
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_millis(100))
    }
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            step,
        }
    }

    /// Calculate the wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }
}

/// Why [`retry_with`] gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with an error that retrying cannot fix
    Permanent(E),
    /// Every attempt failed; carries the last error
    Exhausted { attempts: u32, last: E },
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts.
///
/// `is_transient` decides whether an error is worth another attempt.
/// `on_failure` sees every transient failure (with its 1-based attempt number)
/// before the backoff sleep, including the final one.
pub async fn retry_with<T, E, Op, Fut, Classify, Hook>(
    policy: &RetryPolicy,
    mut operation: Op,
    is_transient: Classify,
    mut on_failure: Hook,
) -> Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: Fn(&E) -> bool,
    Hook: FnMut(u32, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !is_transient(&e) => return Err(RetryError::Permanent(e)),
            Err(e) => {
                on_failure(attempt, &e);
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted { attempts: attempt, last: e });
                }
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
