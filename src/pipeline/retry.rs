//! Bounded retry and fallback around a single fallible async operation.
//!
//! ## Retry Strategy
//!
//! Attempt `n` (1-indexed) that fails is followed by a sleep of
//! `base × n` before attempt `n + 1`: with a 1 s base and 3 attempts the
//! waits are 1 s → 2 s. The last error is returned unchanged once the
//! attempts are spent.
//!
//! This layer recovers transient failures of *one* call. Whether a step that
//! still fails aborts the run or is skipped is decided by the caller (see
//! [`crate::pipeline::refine`]).

use crate::config::ProcessingConfig;
use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Linear backoff base.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff())
    }

    /// Delay after failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `op` until it succeeds or the policy's attempts are spent.
///
/// Every error is considered retryable. The final error is returned as-is.
pub async fn execute_with_retry<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{}: succeeded on attempt {}/{}", label, attempt, attempts);
                }
                return Ok(value);
            }
            Err(e) if attempt >= attempts => {
                warn!("{}: attempt {}/{} failed — {}; giving up", label, attempt, attempts, e);
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{}: attempt {}/{} failed — {}; retrying in {}ms",
                    label,
                    attempt,
                    attempts,
                    e,
                    delay.as_millis()
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Run `primary` with retries; if it is exhausted, run `fallback` once.
///
/// The fallback's own error is returned when it fails too.
pub async fn execute_with_fallback<T, E, P, PFut, B, BFut>(
    label: &str,
    policy: &RetryPolicy,
    primary: P,
    fallback: B,
) -> Result<T, E>
where
    P: FnMut() -> PFut,
    PFut: Future<Output = Result<T, E>>,
    B: FnOnce() -> BFut,
    BFut: Future<Output = Result<T, E>>,
    E: Display,
{
    match execute_with_retry(label, policy, primary).await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("{}: primary exhausted ({}); invoking fallback", label, e);
            fallback().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn linear_backoff() {
        let p = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = execute_with_retry("t", &fast_policy(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(format!("fail {n}"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = execute_with_retry("t", &fast_policy(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("fail {n}"))
        })
        .await;
        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fallback_runs_once_after_primary_exhausted() {
        let primary_calls = AtomicU32::new(0);
        let fallback_calls = AtomicU32::new(0);
        let result: Result<&str, String> = execute_with_fallback(
            "t",
            &fast_policy(2),
            || async {
                primary_calls.fetch_add(1, Ordering::SeqCst);
                Err("primary down".to_string())
            },
            || async {
                fallback_calls.fetch_add(1, Ordering::SeqCst);
                Ok("fallback")
            },
        )
        .await;
        assert_eq!(result, Ok("fallback"));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_error_is_returned() {
        let result: Result<(), String> = execute_with_fallback(
            "t",
            &fast_policy(1),
            || async { Err("primary".to_string()) },
            || async { Err("fallback".to_string()) },
        )
        .await;
        assert_eq!(result, Err("fallback".to_string()));
    }

    #[test]
    fn fallback_skipped_when_primary_succeeds() {
        let result: Result<u8, String> = tokio_test::block_on(execute_with_fallback(
            "t",
            &fast_policy(3),
            || async { Ok(1) },
            || async { Ok(2) },
        ));
        assert_eq!(result, Ok(1));
    }
}
