//! Provider fallback chain
//!
//! Providers are tried in order. Each call is raced against the chain's
//! timeout; the first success wins and later providers are never called.
//! When every provider fails or times out the chain answers with a
//! degraded value built from the input. It never returns an error.
//!
//! With a [`BreakerRegistry`] attached, each provider is gated by the
//! breaker registered under its name, and outcomes feed that breaker.

use crate::registry::BreakerRegistry;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{BoxError, FallbackConfig};

/// Alternative source of an answer
#[async_trait::async_trait]
pub trait Provider<I, O>: Send + Sync {
    /// Name used in logs, attempt records and breaker lookups
    fn name(&self) -> &str;

    /// Produce an answer
    ///
    /// # Errors
    /// Any provider failure; the chain moves on to the next provider.
    async fn ask(&self, input: &I) -> Result<O, BoxError>;
}

type ProviderFn<I, O> = dyn Fn(&I) -> BoxFuture<'static, Result<O, BoxError>> + Send + Sync;

/// Provider backed by a closure
pub struct FnProvider<I, O> {
    name: String,
    f: Arc<ProviderFn<I, O>>,
}

impl<I, O> FnProvider<I, O> {
    /// Wrap a closure returning a boxed future
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&I) -> BoxFuture<'static, Result<O, BoxError>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }
}

impl<I, O> fmt::Debug for FnProvider<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProvider").field("name", &self.name).finish()
    }
}

#[async_trait::async_trait]
impl<I, O> Provider<I, O> for FnProvider<I, O>
where
    I: Send + Sync,
    O: Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn ask(&self, input: &I) -> Result<O, BoxError> {
        (self.f)(input).await
    }
}

/// Why a provider was passed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// Call did not finish in time
    TimedOut {
        /// Timeout that expired
        after: Duration,
    },
    /// Call returned an error
    Failed {
        /// Error text
        message: String,
    },
    /// Breaker refused the call
    CircuitOpen,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut { after } => write!(f, "timed out after {}ms", after.as_millis()),
            Self::Failed { message } => write!(f, "failed: {message}"),
            Self::CircuitOpen => f.write_str("circuit open"),
        }
    }
}

/// One provider that did not answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    /// Provider name
    pub provider: String,
    /// Reason
    pub failure: AttemptFailure,
}

/// Result of a chain call
#[derive(Debug, Clone, PartialEq)]
pub struct Answer<O> {
    /// The answer, possibly degraded
    pub value: O,
    /// Provider that answered; `None` when degraded
    pub provider: Option<String>,
    /// True when no provider answered
    pub degraded: bool,
    /// Providers passed over, in order
    pub attempts: Vec<ProviderAttempt>,
}

type DegradedFn<I, O> = dyn Fn(&I) -> O + Send + Sync;

/// Ordered providers with a degraded last resort
pub struct FallbackChain<I, O> {
    providers: Vec<Arc<dyn Provider<I, O>>>,
    timeout: Duration,
    degraded: Arc<DegradedFn<I, O>>,
    breakers: Option<Arc<BreakerRegistry>>,
}

impl<I, O> FallbackChain<I, O>
where
    I: Send + Sync,
    O: Send,
{
    /// Create an empty chain
    ///
    /// `degraded` builds the answer returned when every provider fails.
    pub fn new<F>(timeout: Duration, degraded: F) -> Self
    where
        F: Fn(&I) -> O + Send + Sync + 'static,
    {
        Self {
            providers: Vec::new(),
            timeout,
            degraded: Arc::new(degraded),
            breakers: None,
        }
    }

    /// Create an empty chain from configuration
    pub fn from_config<F>(config: &FallbackConfig, degraded: F) -> Self
    where
        F: Fn(&I) -> O + Send + Sync + 'static,
    {
        Self::new(config.timeout(), degraded)
    }

    /// Append a provider
    #[must_use]
    pub fn with_provider(mut self, provider: impl Provider<I, O> + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Append a shared provider
    #[must_use]
    pub fn with_shared_provider(mut self, provider: Arc<dyn Provider<I, O>>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Gate providers with breakers from `registry`
    #[must_use]
    pub fn with_breakers(mut self, registry: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(registry);
        self
    }

    /// Number of providers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if the chain has no providers
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Ask providers in order until one answers
    pub async fn ask_with_fallback(&self, input: &I) -> Answer<O> {
        let mut attempts = Vec::new();

        for provider in &self.providers {
            let name = provider.name();
            let breaker = self.breakers.as_ref().map(|registry| registry.get(name));

            if breaker.as_ref().is_some_and(|b| !b.can_pass()) {
                tracing::warn!("Provider {} skipped: circuit open", name);
                attempts.push(ProviderAttempt {
                    provider: name.to_string(),
                    failure: AttemptFailure::CircuitOpen,
                });
                continue;
            }

            let failure = match tokio::time::timeout(self.timeout, provider.ask(input)).await {
                Ok(Ok(value)) => {
                    if let Some(b) = &breaker {
                        b.succeed();
                    }
                    return Answer {
                        value,
                        provider: Some(name.to_string()),
                        degraded: false,
                        attempts,
                    };
                }
                Ok(Err(e)) => AttemptFailure::Failed {
                    message: e.to_string(),
                },
                Err(_) => AttemptFailure::TimedOut {
                    after: self.timeout,
                },
            };

            tracing::warn!("Provider {} {}, falling back", name, failure);
            if let Some(b) = &breaker {
                b.fail();
            }
            attempts.push(ProviderAttempt {
                provider: name.to_string(),
                failure,
            });
        }

        tracing::warn!(
            "All {} providers failed, returning degraded answer",
            self.providers.len()
        );
        Answer {
            value: (self.degraded)(input),
            provider: None,
            degraded: true,
            attempts,
        }
    }
}

impl<I, O> fmt::Debug for FallbackChain<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("providers", &self.providers.len())
            .field("timeout", &self.timeout)
            .field("breakers", &self.breakers.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing(name: &str) -> FnProvider<String, String> {
        FnProvider::new(name, |_: &String| {
            async { Err::<String, BoxError>("upstream 503".into()) }.boxed()
        })
    }

    fn answering(name: &str, calls: Arc<AtomicU32>) -> FnProvider<String, String> {
        let label = name.to_string();
        FnProvider::new(name, move |q: &String| {
            calls.fetch_add(1, Ordering::SeqCst);
            let reply = format!("{label}: {q}");
            async move { Ok(reply) }.boxed()
        })
    }

    fn slow(name: &str) -> FnProvider<String, String> {
        FnProvider::new(name, |_: &String| {
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("late".to_string())
            }
            .boxed()
        })
    }

    fn chain() -> FallbackChain<String, String> {
        FallbackChain::new(Duration::from_secs(5), |q: &String| format!("degraded: {q}"))
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_wins_and_later_providers_are_unused() {
        let second_calls = Arc::new(AtomicU32::new(0));
        let third_calls = Arc::new(AtomicU32::new(0));
        let chain = chain()
            .with_provider(failing("a"))
            .with_provider(answering("b", Arc::clone(&second_calls)))
            .with_provider(answering("c", Arc::clone(&third_calls)));

        let answer = chain.ask_with_fallback(&"hi".to_string()).await;

        assert_eq!(answer.value, "b: hi");
        assert_eq!(answer.provider.as_deref(), Some("b"));
        assert!(!answer.degraded);
        assert_eq!(answer.attempts.len(), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_advances_to_next_provider() {
        let calls = Arc::new(AtomicU32::new(0));
        let chain = chain()
            .with_provider(slow("slow"))
            .with_provider(answering("fast", calls));

        let answer = chain.ask_with_fallback(&"q".to_string()).await;

        assert_eq!(answer.provider.as_deref(), Some("fast"));
        assert_eq!(
            answer.attempts[0].failure,
            AttemptFailure::TimedOut {
                after: Duration::from_secs(5)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn all_failing_yields_degraded_answer() {
        let chain = chain().with_provider(failing("a")).with_provider(slow("b"));

        let answer = chain.ask_with_fallback(&"q".to_string()).await;

        assert!(answer.degraded);
        assert_eq!(answer.value, "degraded: q");
        assert!(answer.provider.is_none());
        assert_eq!(answer.attempts.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_skips_provider() {
        let registry = Arc::new(BreakerRegistry::new(1, Duration::from_secs(30)));
        let calls = Arc::new(AtomicU32::new(0));
        let chain = chain()
            .with_provider(failing("a"))
            .with_provider(answering("b", Arc::clone(&calls)))
            .with_breakers(Arc::clone(&registry));

        let first = chain.ask_with_fallback(&"q".to_string()).await;
        assert!(matches!(first.attempts[0].failure, AttemptFailure::Failed { .. }));

        let second = chain.ask_with_fallback(&"q".to_string()).await;
        assert_eq!(second.attempts[0].failure, AttemptFailure::CircuitOpen);
        assert_eq!(second.provider.as_deref(), Some("b"));
    }
}
