//! Vigil configuration
//!
//! One `VigilConfig` covers every tunable of the protection layer and the
//! governance jobs. All sections have defaults, so a TOML file only needs the
//! keys it wants to change:
//!
//! ```toml
//! [breaker]
//! threshold = 4
//! cool_ms = 8000
//!
//! [governance]
//! policy_id = "default-governance"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Circuit breaker settings
    pub breaker: BreakerConfig,
    /// Retry settings
    pub retry: RetryConfig,
    /// Fallback chain settings
    pub fallback: FallbackConfig,
    /// Cache and throttle settings
    pub cache: CacheConfig,
    /// Rate limiter settings
    pub limiter: LimiterConfig,
    /// Telemetry aggregation settings
    pub telemetry: TelemetryConfig,
    /// Policy evaluation and enforcement settings
    pub governance: GovernanceConfig,
}

impl VigilConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text and validate it
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` if a value is out of range
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Same as [`VigilConfig::from_toml_str`], plus `ConfigError::Io`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breaker.threshold == 0 {
            return Err(ConfigError::Invalid("breaker.threshold must be >= 1".into()));
        }
        if self.retry.times == 0 {
            return Err(ConfigError::Invalid("retry.times must be >= 1".into()));
        }
        if self.limiter.max_calls == 0 {
            return Err(ConfigError::Invalid("limiter.max_calls must be >= 1".into()));
        }
        if self.limiter.window_ms == 0 {
            return Err(ConfigError::Invalid("limiter.window_ms must be > 0".into()));
        }
        if self.telemetry.sample_size == 0 {
            return Err(ConfigError::Invalid("telemetry.sample_size must be >= 1".into()));
        }
        if self.governance.policy_id.trim().is_empty() {
            return Err(ConfigError::Invalid("governance.policy_id must not be empty".into()));
        }
        Ok(())
    }

    /// With breaker settings
    #[inline]
    #[must_use]
    pub fn with_breaker(mut self, threshold: u32, cool_ms: u64) -> Self {
        self.breaker = BreakerConfig { threshold, cool_ms };
        self
    }

    /// With retry settings
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, times: u32, initial_delay_ms: u64) -> Self {
        self.retry = RetryConfig {
            times,
            initial_delay_ms,
        };
        self
    }

    /// With governance policy id
    #[inline]
    #[must_use]
    pub fn with_policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.governance.policy_id = policy_id.into();
        self
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub threshold: u32,
    /// Time the circuit stays open before a trial call is allowed
    pub cool_ms: u64,
}

impl BreakerConfig {
    /// Cool-down as a duration
    #[inline]
    #[must_use]
    pub fn cool(&self) -> Duration {
        Duration::from_millis(self.cool_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cool_ms: 8_000,
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub times: u32,
    /// Wait before the second attempt; doubles afterwards
    pub initial_delay_ms: u64,
}

impl RetryConfig {
    /// Initial delay as a duration
    #[inline]
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            times: 3,
            initial_delay_ms: 200,
        }
    }
}

/// Fallback chain settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Per-provider timeout
    pub timeout_ms: u64,
}

impl FallbackConfig {
    /// Timeout as a duration
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

/// Cache and throttle settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub max_capacity: u64,
    /// TTL used by `set_default`
    pub default_ttl_ms: u64,
    /// Minimum spacing enforced by the throttle
    pub throttle_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            default_ttl_ms: 30_000,
            throttle_interval_ms: 120,
        }
    }
}

/// Sliding-window rate limiter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Calls admitted per window
    pub max_calls: usize,
    /// Window length
    pub window_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            window_ms: 1_000,
        }
    }
}

/// Telemetry aggregation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Number of most recent raw records reduced per run
    pub sample_size: usize,
    /// Length of the `top_fail_cases` list
    pub top_fail_cases: usize,
    /// Unique regressions kept verbatim in the daily document
    pub max_regressions: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sample_size: 10,
            top_fail_cases: 5,
            max_regressions: 10,
        }
    }
}

/// Decision applied when an action is neither allowed nor denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultDecision {
    /// Permit unlisted actions
    Allow,
    /// Refuse unlisted actions
    #[default]
    Deny,
}

/// Governance settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Policy document holding the threshold rules
    pub policy_id: String,
    /// Runtime-ops scope written by the evaluator
    pub runtime_scope: String,
    /// Fallback decision for unlisted actions
    pub default_decision: DefaultDecision,
    /// Default page size for audit listings
    pub audit_list_limit: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            policy_id: "default-governance".to_string(),
            runtime_scope: "global".to_string(),
            default_decision: DefaultDecision::Deny,
            audit_list_limit: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = VigilConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.breaker.threshold, 5);
        assert_eq!(config.breaker.cool(), Duration::from_millis(8_000));
        assert_eq!(config.retry.initial_delay(), Duration::from_millis(200));
        assert_eq!(config.governance.default_decision, DefaultDecision::Deny);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = VigilConfig::from_toml_str(
            r#"
            [breaker]
            threshold = 4

            [governance]
            default_decision = "allow"
            "#,
        )
        .unwrap();

        assert_eq!(config.breaker.threshold, 4);
        assert_eq!(config.breaker.cool_ms, 8_000);
        assert_eq!(config.governance.default_decision, DefaultDecision::Allow);
        assert_eq!(config.telemetry.sample_size, 10);
    }

    #[test]
    fn zero_threshold_rejected() {
        let err = VigilConfig::from_toml_str("[breaker]\nthreshold = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        let err = VigilConfig::from_toml_str("[breaker\nthreshold = 4").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        std::fs::write(&path, "[retry]\ntimes = 5\n").unwrap();

        let config = VigilConfig::load(&path).unwrap();
        assert_eq!(config.retry.times, 5);

        let missing = VigilConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
