//! Breaker registry
//!
//! Owns one [`CircuitBreaker`] per dependency id. Pass the registry by
//! reference (or `Arc`) to whatever wraps outbound calls; there is no
//! process-global breaker state.

use crate::breaker::{CircuitBreaker, CircuitState};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use vigil_core::BreakerConfig;

/// Concurrent map of dependency id to breaker
#[derive(Debug)]
pub struct BreakerRegistry {
    threshold: u32,
    cool: Duration,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create registry; new breakers use these settings
    #[inline]
    #[must_use]
    pub fn new(threshold: u32, cool: Duration) -> Self {
        Self {
            threshold,
            cool,
            breakers: DashMap::new(),
        }
    }

    /// Create registry from configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(config.threshold, config.cool())
    }

    /// Breaker for a dependency, created closed on first use
    #[must_use]
    pub fn get(&self, dependency_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(dependency_id) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.breakers
                .entry(dependency_id.to_string())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(dependency_id, self.threshold, self.cool))
                })
                .value(),
        )
    }

    /// Snapshot of every breaker, ordered by dependency id
    #[must_use]
    pub fn snapshot(&self) -> Vec<CircuitState> {
        let mut states: Vec<_> = self.breakers.iter().map(|b| b.value().stats()).collect();
        states.sort_by(|a, b| a.dependency_id.cmp(&b.dependency_id));
        states
    }

    /// Force one breaker closed; returns false if it was never created
    pub fn reset(&self, dependency_id: &str) -> bool {
        match self.breakers.get(dependency_id) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Number of tracked dependencies
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Check if no breaker has been created yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::from_config(&BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitStatus;

    #[tokio::test(start_paused = true)]
    async fn same_dependency_shares_breaker() {
        let registry = BreakerRegistry::new(1, Duration::from_secs(5));
        registry.get("search").fail();

        assert_eq!(registry.get("search").status(), CircuitStatus::Open);
        assert_eq!(registry.get("llm").status(), CircuitStatus::Closed);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_is_sorted_and_reset_closes() {
        let registry = BreakerRegistry::new(1, Duration::from_secs(5));
        registry.get("zeta").fail();
        let _ = registry.get("alpha");

        let ids: Vec<_> = registry
            .snapshot()
            .into_iter()
            .map(|s| s.dependency_id)
            .collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);

        assert!(registry.reset("zeta"));
        assert!(!registry.reset("missing"));
        assert_eq!(registry.get("zeta").status(), CircuitStatus::Closed);
    }
}
