use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::classification::ErrorClassification;
use super::types::RestackError;
use tracing::{debug, warn};

impl ErrorClassification {
    /// Calculate the retry delay for this error classification based on the
    /// current attempt number (0-indexed).
    ///
    /// - TimeoutError: 5s + (attempt * 5s), capped at 30s
    /// - Default: exponential backoff 2^attempt + random jitter (0-1s), capped at 30s
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        match self.error_type {
            "TimeoutError" => {
                let secs = 5 + (attempt as u64 * 5);
                Duration::from_secs(secs.min(30))
            }
            _ => {
                let base: f64 = 2.0_f64.powi(attempt as i32);
                let jitter: f64 = rand::random::<f64>();
                Duration::from_secs_f64((base + jitter).min(30.0))
            }
        }
    }
}

/// Retry configuration for calls against external tool APIs.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Execute an async operation with retry logic.
///
/// Retries only if the error is classified as retryable and we haven't
/// exceeded max_retries. Cancelling `cancel` interrupts a backoff wait.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut factory: F,
) -> Result<T, RestackError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RestackError>>,
{
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match factory().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();
                if !classification.retryable || attempt + 1 >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max = max_attempts,
                        error_type = classification.error_type,
                        "Giving up after error"
                    );
                    return Err(e);
                }

                let delay = classification.retry_delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "Retrying after error"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(RestackError::Cancelled(format!("{} cancelled during backoff", operation_name)));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

/// Ceiling and pacing for a polling loop: at most `max_attempts` checks,
/// `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }

    /// Policy that gives up once `timeout` has been spent sleeping.
    pub fn for_timeout(timeout: Duration, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let attempts = (timeout.as_millis() / interval.as_millis()).max(1) + 1;
        Self::fixed(attempts.min(u32::MAX as u128) as u32, interval)
    }
}

/// Poll `check` until it yields `Some`, the attempt budget runs out
/// (`Timeout`) or `cancel` fires (`Cancelled`).
///
/// Check errors count as a failed attempt; the last one is kept in the
/// timeout message.
pub async fn poll_until<F, Fut, T>(
    operation_name: &str,
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, RestackError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, RestackError>>,
{
    let mut last_error: Option<String> = None;

    for attempt in 0..policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(RestackError::Cancelled(format!("{} cancelled", operation_name)));
        }

        match check().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                debug!(operation = operation_name, attempt = attempt + 1, "Condition not met yet");
            }
            Err(e) => {
                debug!(operation = operation_name, attempt = attempt + 1, error = %e, "Check failed");
                last_error = Some(e.to_string());
            }
        }

        if attempt + 1 >= policy.max_attempts {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RestackError::Cancelled(format!("{} cancelled", operation_name)));
            }
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }

    Err(RestackError::Timeout(match last_error {
        Some(e) => format!("{} gave up after {} attempts (last error: {})", operation_name, policy.max_attempts, e),
        None => format!("{} gave up after {} attempts", operation_name, policy.max_attempts),
    }))
}
