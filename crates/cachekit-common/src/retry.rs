//! Retry policy for transient failures.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (1 = no retries).
    pub attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Add up to 25% jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait before the given attempt (1-indexed; attempt 1 has none).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 2).min(16);
        let scaled = self.base_delay.as_secs_f64() * 2f64.powi(exponent as i32);
        let delay = Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()));

        if self.jitter {
            delay + Duration::from_secs_f64(delay.as_secs_f64() * jitter_fraction() * 0.25)
        } else {
            delay
        }
    }
}

/// Pseudo-random fraction in [0.0, 1.0) derived from the clock.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos) / f64::from(u32::MAX)
}

/// Run a fallible async operation under a retry policy.
///
/// The operation is retried on every `Err` until the policy's attempt count
/// is exhausted; the final error is returned as-is.
pub async fn retry_async<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_error = None;

    for attempt in 1..=policy.attempts.max(1) {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            debug!(attempt, ?delay, "retrying after backoff");
            sleep(delay).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt < policy.attempts {
                    warn!(attempt, error = %err, "attempt failed, will retry");
                }
                last_error = Some(err);
            }
        }
    }

    // attempts >= 1, so at least one error was recorded
    Err(last_error.expect("retry_async ran zero attempts"))
}
