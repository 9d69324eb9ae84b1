//! Error types for the audit log

use vigil_core::StoreError;

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors raised by the audit log
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Chain link or entry hash does not match
    #[error("audit chain broken at {id}: {reason}")]
    IntegrityViolation {
        /// Entry where verification failed
        id: String,
        /// What did not match
        reason: String,
    },

    /// No id greater than the current head can be generated
    #[error("audit id space exhausted after {last}")]
    IdExhausted {
        /// Last id issued
        last: String,
    },

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuditError {
    /// Create integrity violation
    pub fn integrity(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Check if retrying the operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::IntegrityViolation { .. } | Self::IdExhausted { .. } => false,
        }
    }
}
