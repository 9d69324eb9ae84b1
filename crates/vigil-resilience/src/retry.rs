//! Retry with exponential backoff
//!
//! `retry` makes up to `times` attempts and waits `d, 2d, 4d, ...` between
//! them. There is no wait after the final failure and the last error is
//! returned as-is. Dropping the returned future cancels any pending wait.

use crate::breaker::CircuitBreaker;
use crate::error::ResilienceError;
use std::future::Future;
use std::time::Duration;
use vigil_core::RetryConfig;

/// Attempt count and initial delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    times: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    /// Create policy; `times` below one is treated as one
    #[inline]
    #[must_use]
    pub fn new(times: u32, initial_delay: Duration) -> Self {
        Self {
            times: times.max(1),
            initial_delay,
        }
    }

    /// Create policy from configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.times, config.initial_delay())
    }

    /// Total attempts
    #[inline]
    #[must_use]
    pub fn times(&self) -> u32 {
        self.times
    }

    /// Waits between consecutive attempts
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let initial = self.initial_delay;
        (0..self.times - 1).map(move |i| initial.saturating_mul(2_u32.saturating_pow(i)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up
///
/// # Errors
/// The error of the last attempt.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delays = policy.delays();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => match delays.next() {
                Some(delay) => {
                    tracing::debug!(
                        "Attempt {} failed, retrying in {}ms",
                        attempt,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

/// Run `op` once through a breaker
///
/// # Errors
/// `CircuitOpen` if the breaker refuses the call, otherwise the operation's error.
pub async fn with_breaker<T, E, F, Fut>(
    breaker: &CircuitBreaker,
    op: F,
) -> Result<T, ResilienceError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !breaker.can_pass() {
        return Err(ResilienceError::circuit_open(breaker.dependency_id()));
    }
    match op().await {
        Ok(value) => {
            breaker.succeed();
            Ok(value)
        }
        Err(e) => {
            breaker.fail();
            Err(ResilienceError::Failed(e))
        }
    }
}

/// Retry `op` with every attempt gated by a breaker
///
/// Each attempt consults `can_pass` and records its outcome, so a breaker
/// that opens mid-retry stops the loop immediately with `CircuitOpen`.
///
/// # Errors
/// `CircuitOpen` when refused, otherwise the last attempt's error.
pub async fn with_breaker_and_retry<T, E, F, Fut>(
    breaker: &CircuitBreaker,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, ResilienceError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delays = policy.delays();
    loop {
        if !breaker.can_pass() {
            tracing::warn!("Circuit {} open, failing fast", breaker.dependency_id());
            return Err(ResilienceError::circuit_open(breaker.dependency_id()));
        }
        match op().await {
            Ok(value) => {
                breaker.succeed();
                return Ok(value);
            }
            Err(e) => {
                breaker.fail();
                match delays.next() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(ResilienceError::Failed(e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::new(4, Duration::from_millis(200));
        let delays: Vec<_> = policy.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![200, 400, 800]);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).times(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_op_runs_times_and_waits_between() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let policy = RetryPolicy::new(3, Duration::from_millis(200));

        let result: Result<(), &str> = retry(&policy, || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down")
            }
        })
        .await;

        assert_eq!(result, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 200 + 400, nothing after the last attempt
        assert_eq!(start.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_millis(10));

        let result = retry(&policy, || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err("flaky")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opening_mid_retry_fails_fast() {
        let breaker = CircuitBreaker::new("llm", 2, Duration::from_secs(8));
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_millis(10));

        let result: Result<(), ResilienceError<&str>> =
            with_breaker_and_retry(&breaker, &policy, || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("down")
                }
            })
            .await;

        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn with_breaker_records_outcomes() {
        let breaker = CircuitBreaker::new("db", 1, Duration::from_secs(1));

        let ok: Result<u8, ResilienceError<&str>> = with_breaker(&breaker, || async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);

        let err: Result<u8, ResilienceError<&str>> =
            with_breaker(&breaker, || async { Err("boom") }).await;
        assert_eq!(err.unwrap_err().into_inner(), Some("boom"));

        let refused: Result<u8, ResilienceError<&str>> =
            with_breaker(&breaker, || async { Ok(2) }).await;
        assert!(refused.unwrap_err().is_circuit_open());
    }
}
