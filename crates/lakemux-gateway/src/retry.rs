//! Resilient request executor
//!
//! One retry/backoff policy shared by the SQL path and the REST path:
//! classify the failure, raise client errors immediately, back off
//! exponentially on everything else, give up after the attempt bound.

use std::future::Future;
use std::time::Duration;

use lakemux_core::GatewayError;
use tracing::{debug, warn};

/// Retry policy applied by [`retry_operation`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based): `base × 2^(retry-1)`.
    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// Non-retryable failures (client errors, authentication, configuration)
/// are raised on first sight; the last observed error is raised once
/// attempts are exhausted.
pub async fn retry_operation<T, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("[Retry] {} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                debug!("[Retry] {} failed terminally: {}", label, err);
                return Err(err);
            }
            Err(err) => {
                if attempt >= policy.max_attempts {
                    warn!(
                        "[Retry] {} exhausted {} attempts: {}",
                        label, policy.max_attempts, err
                    );
                    return Err(err);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    "[Retry] {} failed (attempt {}/{}), retrying in {:?}: {}",
                    label, attempt, policy.max_attempts, delay, err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
