//! Governance facade
//!
//! Wires one store, one audit log and one configuration into the jobs, the
//! gatekeeper and the query surface. This is what the CLI drives.

use crate::delivery::{EffectDelivery, NOTIFIER_DEPENDENCY};
use crate::error::OpsResult;
use crate::gate::{policy_cache_key, Gatekeeper};
use crate::jobs::{AggregationJob, EvaluationJob, EvaluationReport};
use crate::queries::GovernanceQueries;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use vigil_audit::{Actor, AuditEvent, AuditLog, Outcome, Subject};
use vigil_core::{
    collections, DailyMetrics, DocumentStore, FollowUpScheduler, LogNotifier, LogScheduler,
    Notifier, RawResult, RecordId, StoreExt, VigilConfig,
};
use vigil_policy::{compile_policy, default_governance_policy, Policy, RuntimeOps};
use vigil_resilience::{BreakerRegistry, RateLimiter, Throttle, TtlCache};
use vigil_telemetry::Aggregator;

/// Audit action for writing the built-in policy
pub const INIT_ACTION: &str = "policy_init";

/// Audit action for compiling a policy source
pub const COMPILE_ACTION: &str = "policy_compile";

/// Entry point for governance operations
pub struct Governance {
    store: Arc<dyn DocumentStore>,
    audit: Arc<AuditLog>,
    config: VigilConfig,
    notifier: Arc<dyn Notifier>,
    backups: Vec<(String, Arc<dyn Notifier>)>,
    scheduler: Arc<dyn FollowUpScheduler>,
    breakers: Arc<BreakerRegistry>,
    limiter: Arc<RateLimiter>,
    throttle: Arc<Throttle>,
    policy_cache: TtlCache,
}

impl fmt::Debug for Governance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Governance")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Governance {
    /// Create facade with logging collaborators
    ///
    /// Breakers, rate limiter, throttle and policy cache are built from
    /// `config` and shared by every run of this facade.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: VigilConfig) -> Self {
        Self {
            audit: Arc::new(AuditLog::new(Arc::clone(&store))),
            breakers: Arc::new(BreakerRegistry::from_config(&config.breaker)),
            limiter: Arc::new(RateLimiter::from_config(&config.limiter)),
            throttle: Arc::new(Throttle::from_config(&config.cache)),
            policy_cache: TtlCache::from_config(&config.cache),
            store,
            config,
            notifier: Arc::new(LogNotifier),
            backups: Vec::new(),
            scheduler: Arc::new(LogScheduler),
        }
    }

    /// With primary notifier
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// With a backup notifier channel, tried after the primary and earlier backups
    #[must_use]
    pub fn with_backup_notifier(mut self, name: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        self.backups.push((name.into(), notifier));
        self
    }

    /// With follow-up scheduler
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn FollowUpScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Breakers guarding outbound collaborators
    #[inline]
    #[must_use]
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Store a raw QA result
    ///
    /// # Errors
    /// `Store` on write failure.
    pub async fn ingest(&self, result: &RawResult) -> OpsResult<RecordId> {
        let id = RecordId::at(result.timestamp);
        self.store
            .save(collections::QA_RESULTS, &id.to_string(), result)
            .await?;
        Ok(id)
    }

    /// Write the built-in policy and clear runtime ops
    ///
    /// # Errors
    /// `Store` or `Audit` on persistence failure.
    pub async fn init_policy(&self, actor: Actor, now: DateTime<Utc>) -> OpsResult<Policy> {
        let mut policy = default_governance_policy();
        policy.policy_id.clone_from(&self.config.governance.policy_id);

        self.store
            .save(collections::POLICIES, &policy.policy_id, &policy)
            .await?;
        self.policy_cache.delete(&policy_cache_key(&policy.policy_id)).await;
        self.store
            .save(
                collections::RUNTIME_OPS,
                &self.config.governance.runtime_scope,
                &RuntimeOps::cleared(now),
            )
            .await?;
        self.audit
            .append_at(
                AuditEvent::new(actor, INIT_ACTION, Outcome::Applied)
                    .with_subject(Subject::policy(&policy.policy_id))
                    .with_policy_ref(&policy.policy_id),
                now,
            )
            .await?;

        tracing::info!("Initialised policy {} with {} rules", policy.policy_id, policy.rules.len());
        Ok(policy)
    }

    /// Compile a YAML policy source and store it
    ///
    /// Failed compilations are audited too.
    ///
    /// # Errors
    /// `Policy` if the source does not compile; `Store` or `Audit` on
    /// persistence failure.
    pub async fn compile_policy(&self, source: &str, actor: Actor, now: DateTime<Utc>) -> OpsResult<Policy> {
        let compiled = compile_policy(source, &actor.uid, now);
        let policy = match compiled {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!("Policy compilation by {} failed: {}", actor.uid, e);
                self.audit
                    .append_at(
                        AuditEvent::new(actor, COMPILE_ACTION, Outcome::Failed)
                            .with_matched_rules([e.to_string()]),
                        now,
                    )
                    .await?;
                return Err(e.into());
            }
        };

        self.store
            .save(collections::POLICIES, &policy.policy_id, &policy)
            .await?;
        self.policy_cache.delete(&policy_cache_key(&policy.policy_id)).await;
        self.audit
            .append_at(
                AuditEvent::new(actor, COMPILE_ACTION, Outcome::Applied)
                    .with_subject(Subject::policy(&policy.policy_id))
                    .with_policy_ref(&policy.policy_id),
                now,
            )
            .await?;

        tracing::info!("Compiled policy {}", policy.policy_id);
        Ok(policy)
    }

    /// Run the aggregation job once
    ///
    /// # Errors
    /// See [`AggregationJob::run`].
    pub async fn run_aggregation(&self, now: DateTime<Utc>) -> OpsResult<Option<DailyMetrics>> {
        AggregationJob::new(Arc::clone(&self.store), Aggregator::new(&self.config.telemetry))
            .run(now)
            .await
    }

    /// Run the evaluation job once
    ///
    /// # Errors
    /// See [`EvaluationJob::run`].
    pub async fn run_evaluation(&self, now: DateTime<Utc>) -> OpsResult<Option<EvaluationReport>> {
        EvaluationJob::new(
            Arc::clone(&self.store),
            Arc::clone(&self.audit),
            self.delivery(),
            self.config.governance.clone(),
        )
        .run(now)
        .await
    }

    /// Effect delivery over the primary notifier and its backups
    fn delivery(&self) -> EffectDelivery {
        let delivery = EffectDelivery::new(
            &self.config,
            Arc::clone(&self.breakers),
            Arc::clone(&self.scheduler),
        )
        .with_limiter(Arc::clone(&self.limiter))
        .with_throttle(Arc::clone(&self.throttle))
        .with_channel(NOTIFIER_DEPENDENCY, Arc::clone(&self.notifier));
        self.backups
            .iter()
            .fold(delivery, |delivery, (name, notifier)| {
                delivery.with_channel(name.clone(), Arc::clone(notifier))
            })
    }

    /// Gatekeeper sharing this facade's store and audit log
    #[must_use]
    pub fn gatekeeper(&self) -> Gatekeeper {
        Gatekeeper::new(
            Arc::clone(&self.store),
            Arc::clone(&self.audit),
            self.config.governance.clone(),
        )
        .with_cache(self.policy_cache.clone())
    }

    /// Read API sharing this facade's store and audit log
    #[must_use]
    pub fn queries(&self) -> GovernanceQueries {
        GovernanceQueries::new(
            Arc::clone(&self.store),
            Arc::clone(&self.audit),
            self.config.governance.clone(),
        )
    }
}
