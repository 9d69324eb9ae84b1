//! Read-only query surface
//!
//! "Not found" is a normal outcome everywhere here: a missing policy is
//! `None`, missing runtime ops read as nothing disabled and an unknown audit
//! id explains as [`Explanation::NotFound`].

use crate::error::OpsResult;
use std::fmt;
use std::sync::Arc;
use vigil_audit::{AuditEntry, AuditFilter, AuditLog, Explanation};
use vigil_core::{collections, DailyMetrics, DocumentStore, GovernanceConfig, StoreExt};
use vigil_policy::{Policy, RuntimeOps};

/// Governance read API
#[derive(Clone)]
pub struct GovernanceQueries {
    store: Arc<dyn DocumentStore>,
    audit: Arc<AuditLog>,
    config: GovernanceConfig,
}

impl fmt::Debug for GovernanceQueries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernanceQueries").finish_non_exhaustive()
    }
}

impl GovernanceQueries {
    /// Create query surface
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, audit: Arc<AuditLog>, config: GovernanceConfig) -> Self {
        Self { store, audit, config }
    }

    /// Policy document by id
    ///
    /// # Errors
    /// `Store` on read or decode failure.
    pub async fn get_policy(&self, policy_id: &str) -> OpsResult<Option<Policy>> {
        Ok(self.store.load(collections::POLICIES, policy_id).await?)
    }

    /// Current runtime ops for the configured scope
    ///
    /// # Errors
    /// `Store` on read or decode failure.
    pub async fn get_runtime_ops(&self) -> OpsResult<RuntimeOps> {
        Ok(self
            .store
            .load(collections::RUNTIME_OPS, &self.config.runtime_scope)
            .await?
            .unwrap_or_default())
    }

    /// Most recent metrics document
    ///
    /// # Errors
    /// `Store` on read or decode failure.
    pub async fn latest_metrics(&self) -> OpsResult<Option<DailyMetrics>> {
        Ok(self
            .store
            .load_recent::<DailyMetrics>(collections::GOVERNANCE, 1)
            .await?
            .into_iter()
            .next()
            .map(|(_, metrics)| metrics))
    }

    /// Audit entries, newest first
    ///
    /// # Errors
    /// `Audit` on read or decode failure.
    pub async fn list_audit(&self, filter: &AuditFilter) -> OpsResult<Vec<AuditEntry>> {
        Ok(self.audit.list(filter).await?)
    }

    /// Default listing filter, sized from configuration
    #[must_use]
    pub fn audit_filter(&self) -> AuditFilter {
        AuditFilter::default().with_limit(self.config.audit_list_limit)
    }

    /// Explain an audited decision
    ///
    /// # Errors
    /// `Audit` if the entry cannot be read.
    pub async fn explain(&self, log_id: &str) -> OpsResult<Explanation> {
        Ok(self.audit.explain(log_id).await?)
    }

    /// Verify the audit chain, returning the number of entries checked
    ///
    /// # Errors
    /// `Audit` with `IntegrityViolation` if the chain is broken.
    pub async fn verify_audit(&self) -> OpsResult<usize> {
        Ok(self.audit.verify_integrity().await?)
    }
}
