use interfaces::LanguageModelError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that can tell a quota/rate-limit rejection apart from other failures.
pub trait RateLimitAware {
    fn is_rate_limited(&self) -> bool;
}

impl RateLimitAware for LanguageModelError {
    fn is_rate_limited(&self) -> bool {
        LanguageModelError::is_rate_limited(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Upper bound of the uniform jitter added to every backoff sleep.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_jitter: Duration::from_secs(1),
        }
    }

    pub const fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Per-item classification and per-batch summarization calls.
    pub const fn standard() -> Self {
        Self::new(3, Duration::from_secs(5))
    }

    /// The final synthesis call, whose failure discards a whole report.
    pub const fn synthesis() -> Self {
        Self::new(5, Duration::from_secs(10))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    max.mul_f64(rand::random::<f64>())
}

/// Invokes `invoke` until it succeeds, retrying only rate-limit failures.
///
/// Before retry `n` the call sleeps `initial_delay * 2^(n-1)` plus a uniform
/// jitter in `[0, max_jitter)`. Any other failure, or the failure of the last
/// allowed attempt, is returned unchanged.
pub async fn call_with_retry<T, E, F, Fut>(mut invoke: F, policy: RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimitAware + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        match invoke().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Call succeeded on attempt {}/{}", attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() && attempt < max_attempts => {
                let sleep_for = delay + jitter(policy.max_jitter);
                warn!(
                    "Quota exceeded. Retrying in {:.2} seconds... (Attempt {}/{}): {}",
                    sleep_for.as_secs_f64(),
                    attempt,
                    max_attempts,
                    e
                );
                tokio::time::sleep(sleep_for).await;
                delay *= 2;
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
    async fn non_rate_limit_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LanguageModelError::Failed("bad request".to_string()))
            },
            RetryPolicy::new(3, Duration::ZERO).with_jitter(Duration::ZERO),
        )
        .await;

        assert_eq!(result, Err(LanguageModelError::Failed("bad request".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_attempts_return_the_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(LanguageModelError::RateLimited(format!("429 #{n}")))
            },
            RetryPolicy::new(3, Duration::ZERO).with_jitter(Duration::ZERO),
        )
        .await;

        assert_eq!(result, Err(LanguageModelError::RateLimited("429 #3".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn jitter_stays_below_bound() {
        for _ in 0..100 {
            assert!(jitter(Duration::from_secs(1)) < Duration::from_secs(1));
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }
}
