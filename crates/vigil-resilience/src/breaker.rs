//! Circuit breaker
//!
//! One breaker guards one dependency. State transitions:
//!
//! ```text
//! closed ──(threshold consecutive failures)──→ open
//! open ──(cool elapsed, next can_pass)──→ half_open
//! half_open ──(success)──→ closed
//! half_open ──(failure)──→ open
//! ```
//!
//! Half-open admits exactly one trial call; other callers are refused until the
//! trial call reports. A trial call that never reports (its caller was cancelled)
//! releases the slot after another cool-down.
//!
//! Outcome recording is serialized per breaker by a mutex. A call admitted
//! just before the circuit opens may still complete and report; outcomes
//! reported while the circuit is open are ignored.

use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use vigil_core::BreakerConfig;

/// Breaker position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitStatus {
    /// Calls flow normally
    Closed,
    /// Calls are refused until the cool-down ends
    Open,
    /// Probing: one caller is admitted and its outcome decides
    HalfOpen,
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitState {
    /// Dependency guarded by the breaker
    pub dependency_id: String,
    /// Consecutive failures counted while closed
    pub failure_count: u32,
    /// Current position
    pub status: CircuitStatus,
    /// End of the current cool-down, if the circuit has opened
    pub open_until: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    status: CircuitStatus,
    failure_count: u32,
    open_until: Option<Instant>,
    trial_since: Option<Instant>,
}

/// Per-dependency circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    dependency_id: String,
    threshold: u32,
    cool: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    ///
    /// A `threshold` of zero is treated as one.
    #[must_use]
    pub fn new(dependency_id: impl Into<String>, threshold: u32, cool: Duration) -> Self {
        Self {
            dependency_id: dependency_id.into(),
            threshold: threshold.max(1),
            cool,
            inner: Mutex::new(Inner {
                status: CircuitStatus::Closed,
                failure_count: 0,
                open_until: None,
                trial_since: None,
            }),
        }
    }

    /// Create a breaker from configuration
    #[inline]
    #[must_use]
    pub fn from_config(dependency_id: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::new(dependency_id, config.threshold, config.cool())
    }

    /// Dependency guarded by this breaker
    #[inline]
    #[must_use]
    pub fn dependency_id(&self) -> &str {
        &self.dependency_id
    }

    /// Failures needed to open
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Cool-down length
    #[inline]
    #[must_use]
    pub fn cool(&self) -> Duration {
        self.cool
    }

    /// Whether a call may proceed now
    ///
    /// An open circuit whose cool-down has elapsed moves to half-open and
    /// admits the caller as its single trial call.
    pub fn can_pass(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.status {
            CircuitStatus::Closed => true,
            CircuitStatus::HalfOpen => {
                let stale = inner
                    .trial_since
                    .map_or(true, |since| now >= since + self.cool);
                if stale {
                    tracing::debug!("Circuit {} trial call abandoned, admitting another", self.dependency_id);
                    inner.trial_since = Some(now);
                }
                stale
            }
            CircuitStatus::Open => {
                if inner.open_until.is_some_and(|until| now >= until) {
                    inner.status = CircuitStatus::HalfOpen;
                    inner.trial_since = Some(now);
                    tracing::info!("Circuit {} half-open, probing", self.dependency_id);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a failed call
    pub fn fail(&self) {
        let mut inner = self.inner.lock();
        match inner.status {
            CircuitStatus::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.threshold {
                    self.trip(&mut inner);
                }
            }
            CircuitStatus::HalfOpen => self.trip(&mut inner),
            CircuitStatus::Open => {}
        }
    }

    /// Record a successful call
    pub fn succeed(&self) {
        let mut inner = self.inner.lock();
        match inner.status {
            CircuitStatus::Closed => inner.failure_count = 0,
            CircuitStatus::HalfOpen => {
                inner.status = CircuitStatus::Closed;
                inner.failure_count = 0;
                inner.open_until = None;
                inner.trial_since = None;
                tracing::info!("Circuit {} closed", self.dependency_id);
            }
            CircuitStatus::Open => {}
        }
    }

    /// Current position
    #[must_use]
    pub fn status(&self) -> CircuitStatus {
        self.inner.lock().status
    }

    /// Snapshot of the breaker
    #[must_use]
    pub fn stats(&self) -> CircuitState {
        let inner = self.inner.lock();
        CircuitState {
            dependency_id: self.dependency_id.clone(),
            failure_count: inner.failure_count,
            status: inner.status,
            open_until: inner.open_until,
        }
    }

    /// Force the breaker closed
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.status = CircuitStatus::Closed;
        inner.failure_count = 0;
        inner.open_until = None;
        inner.trial_since = None;
    }

    fn trip(&self, inner: &mut Inner) {
        inner.status = CircuitStatus::Open;
        inner.failure_count = 0;
        inner.open_until = Some(Instant::now() + self.cool);
        inner.trial_since = None;
        tracing::warn!(
            "Circuit {} opened for {}ms",
            self.dependency_id,
            self.cool.as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("llm", 3, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn opens_at_threshold_and_resets_counter() {
        let cb = breaker();
        cb.fail();
        cb.fail();
        assert_eq!(cb.status(), CircuitStatus::Closed);
        assert_eq!(cb.stats().failure_count, 2);

        cb.fail();
        let stats = cb.stats();
        assert_eq!(stats.status, CircuitStatus::Open);
        assert_eq!(stats.failure_count, 0);
        assert!(stats.open_until.is_some());
        assert!(!cb.can_pass());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_count() {
        let cb = breaker();
        cb.fail();
        cb.fail();
        cb.succeed();
        cb.fail();
        cb.fail();
        assert_eq!(cb.status(), CircuitStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let cb = breaker();
        for _ in 0..3 {
            cb.fail();
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        assert!(cb.can_pass());
        assert_eq!(cb.status(), CircuitStatus::HalfOpen);
        cb.fail();
        assert_eq!(cb.status(), CircuitStatus::Open);
        assert!(!cb.can_pass());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_a_single_trial_call() {
        let cb = breaker();
        for _ in 0..3 {
            cb.fail();
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        let admitted: Vec<bool> = (0..5).map(|_| cb.can_pass()).collect();
        assert_eq!(admitted, vec![true, false, false, false, false]);
        assert_eq!(cb.status(), CircuitStatus::HalfOpen);

        cb.succeed();
        assert_eq!(cb.status(), CircuitStatus::Closed);
        assert!((0..3).all(|_| cb.can_pass()));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_call_frees_slot_after_cool() {
        let cb = breaker();
        for _ in 0..3 {
            cb.fail();
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.can_pass());
        assert!(!cb.can_pass());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!cb.can_pass());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.can_pass());
        assert!(!cb.can_pass());
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_while_open_are_ignored() {
        let cb = breaker();
        for _ in 0..3 {
            cb.fail();
        }
        let until = cb.stats().open_until;
        cb.fail();
        cb.succeed();
        assert_eq!(cb.status(), CircuitStatus::Open);
        assert_eq!(cb.stats().open_until, until);
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let cb = CircuitBreaker::new("db", 0, Duration::from_millis(10));
        assert_eq!(cb.threshold(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_closes() {
        let cb = breaker();
        for _ in 0..3 {
            cb.fail();
        }
        cb.reset();
        assert!(cb.can_pass());
        assert_eq!(cb.status(), CircuitStatus::Closed);
        assert_eq!(cb.status().to_string(), "closed");
    }
}
