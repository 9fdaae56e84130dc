//! Bounded retry with linear backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tokio::time::sleep;
use tracing::warn;

use super::error::Retryable;

const SOURCE: &str = "client::retry";
const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// How many times an operation may run and how long to wait in between.
///
/// `attempts` is the total budget, including the first call. After the n-th
/// failed attempt the executor waits `base_delay * n`; the delay grows
/// linearly and is not capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl From<&crate::config::RetrySettings> for RetryPolicy {
    fn from(settings: &crate::config::RetrySettings) -> Self {
        Self::new(settings.max_retries.get(), settings.base_delay)
    }
}

impl RetryPolicy {
    /// Build a policy; an attempt budget of zero is clamped to one call.
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        self.base_delay.saturating_mul(failed_attempt)
    }

    /// Every delay the executor can sleep through, in order.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.attempts).map(|attempt| self.backoff_delay(attempt))
    }
}

/// Run `operation` until it succeeds, fails with a permanent error, or the
/// attempt budget is spent. The last error is returned on exhaustion.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.attempts && err.is_retryable() => {
                let delay = policy.backoff_delay(attempt);
                warn!(
                    target = SOURCE,
                    attempt,
                    max_attempts = policy.attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient failure, retrying"
                );
                counter!("pressroom_retry_total").increment(1);
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
