//! Error types for Vigil Ops
//!
//! `OpsError` is the umbrella for everything the jobs, the gatekeeper and the
//! query surface can raise. Lower-level errors convert in with `?`.

use vigil_audit::AuditError;
use vigil_core::{ConfigError, StoreError};
use vigil_policy::PolicyError;

/// Result type for ops operations
pub type OpsResult<T> = Result<T, OpsError>;

/// Main ops error type
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    /// Action refused by governance
    #[error("blocked_by_policy: {action} ({reason})")]
    Blocked {
        /// Action that was refused
        action: String,
        /// Rule or state responsible, e.g. `action_blocked:deploy_model`
        reason: String,
    },

    /// Policy resolution or compilation failed
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Audit log failure
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl OpsError {
    /// Create blocked error
    pub fn blocked(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Blocked {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Check if governance refused the action
    #[inline]
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    /// Check if the next scheduled run may succeed where this one failed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Audit(e) => e.is_retryable(),
            Self::Policy(e) => e.is_retryable(),
            Self::Blocked { .. } | Self::Config(_) => false,
        }
    }
}
