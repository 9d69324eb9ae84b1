//! Error types for Vigil Policy
//!
//! Provides error handling for:
//! - Scope reference errors during resolution (fatal, never defaulted)
//! - Policy compilation failures
//! - Store failures while loading scope or policy documents

use vigil_core::StoreError;

/// Policy error type
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Organisation document does not exist
    #[error("org not found: {org_id}")]
    OrgNotFound {
        /// Requested org
        org_id: String,
    },

    /// Tenant document does not exist
    #[error("tenant not found: {tenant_id}")]
    TenantNotFound {
        /// Requested tenant
        tenant_id: String,
    },

    /// Team document does not exist
    #[error("team not found: {team_id}")]
    TeamNotFound {
        /// Requested team
        team_id: String,
    },

    /// Tenant belongs to another org
    #[error("tenant {tenant_id} belongs to org {actual}, not {expected}")]
    TenantOrgMismatch {
        /// Tenant id
        tenant_id: String,
        /// Org named in the request
        expected: String,
        /// Org the tenant belongs to
        actual: String,
    },

    /// Team belongs to another tenant
    #[error("team {team_id} belongs to tenant {actual:?}, not {expected}")]
    TeamTenantMismatch {
        /// Team id
        team_id: String,
        /// Tenant named in the request
        expected: String,
        /// Tenant the team belongs to
        actual: Option<String>,
    },

    /// Team belongs to another org
    #[error("team {team_id} belongs to org {actual}, not {expected}")]
    TeamOrgMismatch {
        /// Team id
        team_id: String,
        /// Org named in the request
        expected: String,
        /// Org the team belongs to
        actual: String,
    },

    /// Policy source is malformed
    #[error("policy compilation failed: {0}")]
    Compile(String),

    /// YAML syntax error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PolicyError {
    /// Create compile error
    #[inline]
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    /// Check if the error is a bad scope reference
    #[inline]
    #[must_use]
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            Self::OrgNotFound { .. }
                | Self::TenantNotFound { .. }
                | Self::TeamNotFound { .. }
                | Self::TenantOrgMismatch { .. }
                | Self::TeamTenantMismatch { .. }
                | Self::TeamOrgMismatch { .. }
        )
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}

/// Result type alias for policy operations
pub type PolicyResult<T> = Result<T, PolicyError>;
