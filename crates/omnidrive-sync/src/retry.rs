//! Retry policy for adapter calls
//!
//! Transient `AdapterError`s (rate limiting, 5xx, network, timeouts) are
//! retried with exponential backoff up to a fixed number of attempts.
//! Permanent errors return immediately. Every single adapter call also runs
//! under a deadline; exceeding it produces a transient `timeout` error.
//!
//! Backoff schedule with the defaults: 500ms, 1s, 2s, ... capped at 8s.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use omnidrive_core::config::SyncConfig;
use omnidrive_core::ports::AdapterError;
use tracing::{info, warn};

/// Attempt ceiling, backoff schedule and per-call deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        }
    }

    /// Policy that never retries and never sleeps
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt`
    ///
    /// 1-based: the wait after the first failure is `delay_for(1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

/// Errors that know whether another attempt may succeed
pub trait Transient: Display {
    fn is_transient(&self) -> bool;
}

impl Transient for AdapterError {
    fn is_transient(&self) -> bool {
        AdapterError::is_transient(self)
    }
}

/// Runs one adapter call under `timeout`
pub async fn with_timeout<T, Fut>(
    timeout: Duration,
    operation: &str,
    fut: Fut,
) -> Result<T, AdapterError>
where
    Fut: Future<Output = Result<T, AdapterError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::timeout(format!(
            "{operation} exceeded {}s",
            timeout.as_secs_f64()
        ))),
    }
}

/// Executes `f` until it succeeds, fails permanently, or runs out of attempts
///
/// Returns the final result together with the number of attempts consumed.
/// `f` is responsible for applying [`with_timeout`] to the calls it makes.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> (Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return (Ok(value), attempt);
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use omnidrive_core::ports::AdapterErrorKind;

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            call_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            call_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(1000));
    }

    #[test]
    fn from_config_enforces_one_attempt() {
        let config = SyncConfig {
            max_attempts: 0,
            ..SyncConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = &AtomicU32::new(0);
        let (result, attempts) = with_retry(&fast_policy(3), "flaky", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AdapterError::new(AdapterErrorKind::Server, "503"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = &AtomicU32::new(0);
        let (result, attempts) = with_retry(&fast_policy(5), "missing", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(AdapterError::not_found("gone"))
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), AdapterErrorKind::NotFound);
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_stop_at_ceiling() {
        let (result, attempts) = with_retry(&fast_policy(3), "down", || async {
            Err::<(), _>(AdapterError::new(AdapterErrorKind::RateLimited, "429"))
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_as_transient() {
        let result = with_timeout(Duration::from_secs(1), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AdapterError>(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::Timeout);
        assert!(err.is_transient());
    }
}
