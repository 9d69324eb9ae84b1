//! Sliding-window rate limiter and throttle

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use vigil_core::{CacheConfig, LimiterConfig};

/// Snapshot of a limiter window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Admissions still inside the window
    pub calls: usize,
    /// Admissions allowed per window
    pub max_calls: usize,
    /// Window length
    pub window: Duration,
    /// Wait until the next admission, when the window is full
    pub retry_after: Option<Duration>,
}

/// Admits at most `max_calls` per sliding `window`
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create limiter; `max_calls` below one is treated as one
    #[must_use]
    pub fn new(max_calls: usize, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Create limiter from configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(config.max_calls, Duration::from_millis(config.window_ms))
    }

    /// Admit and record a call if the window has room
    pub fn check(&self) -> bool {
        self.try_acquire().is_ok()
    }

    /// Wait until a call is admitted, then record it
    ///
    /// Dropping the future while it waits leaves no admission behind.
    pub async fn wait_if_needed(&self) {
        while let Err(wait) = self.try_acquire() {
            tracing::debug!("Rate limit reached, waiting {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }

    /// Current window state
    #[must_use]
    pub fn window(&self) -> RateWindow {
        let now = Instant::now();
        let mut calls = self.calls.lock();
        self.prune(&mut calls, now);
        RateWindow {
            calls: calls.len(),
            max_calls: self.max_calls,
            window: self.window,
            retry_after: self.wait_for(&calls, now),
        }
    }

    fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut calls = self.calls.lock();
        self.prune(&mut calls, now);
        match self.wait_for(&calls, now) {
            Some(wait) => Err(wait),
            None => {
                calls.push_back(now);
                Ok(())
            }
        }
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while calls
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            calls.pop_front();
        }
    }

    fn wait_for(&self, calls: &VecDeque<Instant>, now: Instant) -> Option<Duration> {
        if calls.len() < self.max_calls {
            return None;
        }
        calls
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&LimiterConfig::default())
    }
}

/// Spaces consecutive calls by a minimum interval
///
/// Each caller reserves the next free slot before sleeping, so concurrent
/// callers are spread out rather than released together.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Create throttle
    #[inline]
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Create throttle from cache configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_millis(config.throttle_interval_ms))
    }

    /// Wait for this caller's slot
    pub async fn wait(&self) {
        let wait = {
            let now = Instant::now();
            let mut next = self.next_slot.lock();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot - now
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn three_per_second() {
        let limiter = RateLimiter::new(3, Duration::from_millis(1000));

        assert!(limiter.check());
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(limiter.check());
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100));
        assert!(limiter.check());
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(limiter.check());
        assert!(!limiter.check());

        let window = limiter.window();
        assert_eq!(window.calls, 2);
        assert_eq!(window.retry_after, Some(Duration::from_millis(40)));

        tokio::time::advance(Duration::from_millis(40)).await;
        assert!(limiter.check());
        assert!(!limiter.check());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_admits_after_oldest_expires() {
        let limiter = RateLimiter::new(1, Duration::from_millis(500));
        let start = Instant::now();

        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;

        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(limiter.window().calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_spaces_calls() {
        let throttle = Throttle::new(Duration::from_millis(120));
        let start = Instant::now();

        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        throttle.wait().await;
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(240));
    }
}
