//! Scheduled governance jobs
//!
//! Both jobs are thin drivers around pure functions:
//!
//! - [`AggregationJob`]: `qaResults` → [`Aggregator::aggregate`] → `governance/{date}`
//! - [`EvaluationJob`]: latest `governance` doc + policy → [`evaluate`] →
//!   `runtimeOps/{scope}`, `alerts/{id}`, effects handed to
//!   [`EffectDelivery`], one audit entry
//!
//! Re-running either job for the same inputs rewrites the same documents,
//! so overlapping or repeated runs are harmless.

use crate::delivery::EffectDelivery;
use crate::error::OpsResult;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use vigil_audit::{Actor, AuditEvent, AuditLog, Outcome, Subject};
use vigil_core::{
    collections, AlertId, AuditId, DailyMetrics, DocumentStore, GovernanceConfig, RawResult,
    StoreExt,
};
use vigil_policy::{default_governance_policy, evaluate, AlertRecord, Evaluation, Policy};
use vigil_telemetry::Aggregator;

/// Audit action written by every evaluation run
pub const EVALUATE_ACTION: &str = "policy_evaluate";

/// Reduces recent raw results into the day's metrics document
pub struct AggregationJob {
    store: Arc<dyn DocumentStore>,
    aggregator: Aggregator,
}

impl fmt::Debug for AggregationJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationJob")
            .field("aggregator", &self.aggregator)
            .finish_non_exhaustive()
    }
}

impl AggregationJob {
    /// Create job
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, aggregator: Aggregator) -> Self {
        Self { store, aggregator }
    }

    /// Run once
    ///
    /// Returns the document written, or `None` when there were no results.
    ///
    /// # Errors
    /// `Store` if results cannot be read or the document cannot be written;
    /// previously stored documents are left untouched.
    pub async fn run(&self, now: DateTime<Utc>) -> OpsResult<Option<DailyMetrics>> {
        tracing::info!("Aggregation started");
        let results: Vec<RawResult> = self
            .store
            .load_recent::<RawResult>(collections::QA_RESULTS, self.aggregator.sample_size())
            .await?
            .into_iter()
            .map(|(_, result)| result)
            .collect();

        let Some(fresh) = self.aggregator.aggregate(&results, now) else {
            tracing::info!("No QA results to aggregate");
            return Ok(None);
        };

        let key = fresh.key();
        let existing: Option<DailyMetrics> = self.store.load(collections::GOVERNANCE, &key).await?;
        let merged = fresh.merged_onto(existing);

        if let Err(e) = self.store.save(collections::GOVERNANCE, &key, &merged).await {
            tracing::error!("Failed to write governance/{}: {}", key, e);
            return Err(e.into());
        }

        tracing::info!(
            "Aggregation finished: {} (passRate {}, {} tests)",
            key,
            merged.pass_rate,
            merged.test_count
        );
        Ok(Some(merged))
    }
}

/// What an evaluation run did
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    /// Pure evaluation result
    pub evaluation: Evaluation,
    /// Alert stored for the run, if any rule matched
    pub alert_id: Option<AlertId>,
    /// Audit entry of the run
    pub audit_id: AuditId,
    /// Effects that could not be delivered
    pub failed_effects: usize,
}

/// Applies the governance policy to the latest metrics
pub struct EvaluationJob {
    store: Arc<dyn DocumentStore>,
    audit: Arc<AuditLog>,
    delivery: EffectDelivery,
    config: GovernanceConfig,
}

impl fmt::Debug for EvaluationJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationJob")
            .field("delivery", &self.delivery)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EvaluationJob {
    /// Create job
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<AuditLog>,
        delivery: EffectDelivery,
        config: GovernanceConfig,
    ) -> Self {
        Self {
            store,
            audit,
            delivery,
            config,
        }
    }

    /// Run once
    ///
    /// Returns `None` when no metrics document exists yet.
    ///
    /// # Errors
    /// `Store` or `Audit` on persistence failure. Delivery failures are
    /// logged and counted, never returned.
    pub async fn run(&self, now: DateTime<Utc>) -> OpsResult<Option<EvaluationReport>> {
        tracing::info!("Policy evaluation started");
        let latest = self
            .store
            .load_recent::<DailyMetrics>(collections::GOVERNANCE, 1)
            .await?;
        let Some((_, metrics)) = latest.into_iter().next() else {
            tracing::info!("No governance metrics yet, skipping evaluation");
            return Ok(None);
        };

        let policy = self.policy().await?;
        let evaluation = evaluate(&policy, &metrics, now);

        if let Err(e) = self
            .store
            .save(
                collections::RUNTIME_OPS,
                &self.config.runtime_scope,
                &evaluation.runtime_ops,
            )
            .await
        {
            tracing::error!("Failed to write runtime ops: {}", e);
            return Err(e.into());
        }

        let alert_id = match AlertRecord::from_evaluation(&evaluation) {
            Some(record) => {
                self.store
                    .save(collections::ALERTS, &record.id.to_string(), &record)
                    .await?;
                Some(record.id)
            }
            None => None,
        };

        let mut failed_effects = 0;
        for effect in &evaluation.effects {
            if !self.delivery.deliver(effect).await {
                failed_effects += 1;
            }
        }

        let entry = self
            .audit
            .append_at(
                AuditEvent::new(Actor::system(), EVALUATE_ACTION, Outcome::Applied)
                    .with_subject(Subject::policy(&policy.policy_id))
                    .with_policy_ref(&policy.policy_id)
                    .with_matched_rules(evaluation.matched_labels()),
                now,
            )
            .await?;

        tracing::info!(
            "Policy evaluation finished: {} rules matched, {} disabled",
            evaluation.matched.len(),
            evaluation.runtime_ops.disabled.len()
        );
        Ok(Some(EvaluationReport {
            evaluation,
            alert_id,
            audit_id: entry.id,
            failed_effects,
        }))
    }

    async fn policy(&self) -> OpsResult<Policy> {
        let stored: Option<Policy> = self
            .store
            .load(collections::POLICIES, &self.config.policy_id)
            .await?;
        Ok(stored.unwrap_or_else(|| {
            tracing::warn!(
                "Policy {} not found, evaluating built-in defaults",
                self.config.policy_id
            );
            default_governance_policy()
        }))
    }
}
