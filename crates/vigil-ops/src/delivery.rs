//! Effect delivery
//!
//! Outbound calls made on behalf of an evaluation go through the protection
//! layer:
//!
//! ```text
//! Notify      ─→ RateLimiter ─→ FallbackChain[channel: Breaker ─→ Retry] ─→ Notifier
//! ScheduleJob ─→ Throttle    ─→ Breaker ─→ FollowUpScheduler
//! ```
//!
//! Channels are tried in registration order. A notification is delivered
//! when any channel accepts it; the chain's degraded answer marks it as not
//! delivered.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use vigil_core::{BoxError, FollowUpScheduler, Notification, Notifier, VigilConfig};
use vigil_policy::Effect;
use vigil_resilience::{
    with_breaker, with_breaker_and_retry, BreakerRegistry, CircuitBreaker, FallbackChain,
    Provider, RateLimiter, RetryPolicy, Throttle,
};

/// Breaker id, and channel name, of the primary notifier
pub const NOTIFIER_DEPENDENCY: &str = "notifier";

/// Breaker id guarding follow-up scheduling
pub const SCHEDULER_DEPENDENCY: &str = "scheduler";

/// One notifier channel with its own breaker and retry
struct Channel {
    name: String,
    notifier: Arc<dyn Notifier>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

#[async_trait]
impl Provider<Notification, ()> for Channel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ask(&self, notification: &Notification) -> Result<(), BoxError> {
        with_breaker_and_retry(&self.breaker, &self.retry, || {
            self.notifier.notify(notification)
        })
        .await
        .map_err(|e| BoxError::from(e.to_string()))
    }
}

/// Delivers evaluation effects through limiter, breakers, retry and fallback
pub struct EffectDelivery {
    channels: FallbackChain<Notification, ()>,
    scheduler: Arc<dyn FollowUpScheduler>,
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter>,
    throttle: Arc<Throttle>,
}

impl fmt::Debug for EffectDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDelivery")
            .field("channels", &self.channels.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl EffectDelivery {
    /// Create delivery with no notifier channels
    ///
    /// Limiter, throttle, retry and the per-channel timeout come from `config`.
    #[must_use]
    pub fn new(
        config: &VigilConfig,
        breakers: Arc<BreakerRegistry>,
        scheduler: Arc<dyn FollowUpScheduler>,
    ) -> Self {
        Self {
            channels: FallbackChain::from_config(&config.fallback, |_: &Notification| ()),
            scheduler,
            breakers,
            retry: RetryPolicy::from_config(&config.retry),
            limiter: Arc::new(RateLimiter::from_config(&config.limiter)),
            throttle: Arc::new(Throttle::from_config(&config.cache)),
        }
    }

    /// Append a notifier channel, guarded by the breaker named `name`
    #[must_use]
    pub fn with_channel(mut self, name: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        let name = name.into();
        let channel = Channel {
            breaker: self.breakers.get(&name),
            name,
            notifier,
            retry: self.retry,
        };
        self.channels = self.channels.with_provider(channel);
        self
    }

    /// With a limiter shared across runs
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// With a throttle shared across runs
    #[must_use]
    pub fn with_throttle(mut self, throttle: Arc<Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Number of notifier channels
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver one effect; `false` when it could not be delivered
    pub async fn deliver(&self, effect: &Effect) -> bool {
        match effect {
            Effect::Notify(notification) => self.notify(notification).await,
            Effect::ScheduleJob { job } => self.schedule(job).await,
        }
    }

    async fn notify(&self, notification: &Notification) -> bool {
        self.limiter.wait_if_needed().await;
        let answer = self.channels.ask_with_fallback(notification).await;
        match answer.provider {
            Some(channel) if answer.attempts.is_empty() => {
                tracing::debug!("Notification delivered via {}", channel);
                true
            }
            Some(channel) => {
                tracing::warn!(
                    "Notification delivered via {} after {} failed channels",
                    channel,
                    answer.attempts.len()
                );
                true
            }
            None => {
                tracing::warn!(
                    "Notification not delivered: all {} channels failed",
                    answer.attempts.len()
                );
                false
            }
        }
    }

    async fn schedule(&self, job: &str) -> bool {
        self.throttle.wait().await;
        let breaker = self.breakers.get(SCHEDULER_DEPENDENCY);
        match with_breaker(&breaker, || self.scheduler.schedule(job)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Follow-up job {} not scheduled: {}", job, e);
                false
            }
        }
    }
}
