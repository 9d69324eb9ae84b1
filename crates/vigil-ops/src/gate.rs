//! Gatekeeper
//!
//! Pre-flight check placed in front of governed actions.
//!
//! # Enforcement
//!
//! 1. No governance policy stored: allowed.
//! 2. Service outside the policy's `scope.services`: allowed (not governed).
//! 3. Team outside the policy's `scope.teams`: blocked.
//! 4. Action listed in the runtime-ops `disabled` set (or `*` listed): blocked.
//!
//! [`Gatekeeper::authorize`] runs the same checks and then applies the
//! org → tenant → team decision. Every check writes one audit entry; if the
//! entry cannot be written the check fails.
//!
//! The governance policy is read through a [`TtlCache`]; writers that replace
//! the policy invalidate [`policy_cache_key`].

use crate::error::{OpsError, OpsResult};
use std::fmt;
use std::sync::Arc;
use vigil_audit::{Actor, AuditEvent, AuditLog, Outcome, Subject};
use vigil_core::{collections, DocumentStore, GovernanceConfig, StoreExt};
use vigil_policy::{Decision, Policy, PolicyResolver, RuntimeOps, ScopeRef};
use vigil_resilience::TtlCache;

/// Action name recorded when a caller gates a service without naming one
pub const UNNAMED_ACTION: &str = "invoke";

/// Cache key under which a policy document is kept
#[inline]
#[must_use]
pub fn policy_cache_key(policy_id: &str) -> String {
    format!("policy:{policy_id}")
}

/// Outcome of the runtime and scope checks
#[derive(Debug, Clone, PartialEq, Eq)]
struct Check {
    blocked: Option<String>,
    matched_rules: Vec<String>,
    policy_ref: Option<String>,
}

impl Check {
    fn allowed(rule: Option<&str>, policy_ref: Option<String>) -> Self {
        Self {
            blocked: None,
            matched_rules: rule.map(String::from).into_iter().collect(),
            policy_ref,
        }
    }

    fn blocked(reason: String, rule: &str, policy_ref: Option<String>) -> Self {
        Self {
            blocked: Some(reason),
            matched_rules: vec![rule.to_string()],
            policy_ref,
        }
    }
}

/// Policy and runtime-ops gate
#[derive(Clone)]
pub struct Gatekeeper {
    store: Arc<dyn DocumentStore>,
    audit: Arc<AuditLog>,
    resolver: PolicyResolver,
    cache: TtlCache,
    config: GovernanceConfig,
}

impl fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Gatekeeper {
    /// Create gatekeeper
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, audit: Arc<AuditLog>, config: GovernanceConfig) -> Self {
        Self {
            resolver: PolicyResolver::new(Arc::clone(&store)),
            store,
            audit,
            cache: TtlCache::default(),
            config,
        }
    }

    /// With a policy cache shared with policy writers
    #[must_use]
    pub fn with_cache(mut self, cache: TtlCache) -> Self {
        self.cache = cache;
        self
    }

    /// Check a service call against the policy scope and runtime ops
    ///
    /// # Errors
    /// `Blocked` if refused; `Store` or `Audit` on persistence failure.
    pub async fn enforce(&self, service: &str, team_id: Option<&str>, action: Option<&str>) -> OpsResult<()> {
        let action = action.unwrap_or(UNNAMED_ACTION);
        let check = self.check(service, team_id, action).await?;

        let outcome = if check.blocked.is_some() {
            Outcome::Blocked
        } else {
            Outcome::Allowed
        };
        let mut event = AuditEvent::new(Actor::system(), action, outcome)
            .with_subject(Subject::service(service, team_id.map(String::from)))
            .with_matched_rules(check.matched_rules);
        if let Some(policy_ref) = check.policy_ref {
            event = event.with_policy_ref(policy_ref);
        }
        self.audit.append(event).await?;

        match check.blocked {
            Some(reason) => {
                tracing::warn!("Blocked {} on {}: {}", action, service, reason);
                Err(OpsError::blocked(action, reason))
            }
            None => {
                tracing::debug!("Governance check passed: {} on {}", action, service);
                Ok(())
            }
        }
    }

    /// Resolve the allow/deny decision for an action in a scope
    ///
    /// A deny is a normal outcome here, not an error.
    ///
    /// # Errors
    /// Reference errors from resolution; `Store` or `Audit` on persistence failure.
    pub async fn decide(&self, scope: &ScopeRef, action: &str) -> OpsResult<Decision> {
        let resolved = self.resolver.resolve(scope).await?;
        let decision = resolved.decide(action, self.config.default_decision);

        let outcome = if decision.is_allowed() {
            Outcome::Allowed
        } else {
            Outcome::Blocked
        };
        let mut event = AuditEvent::new(Actor::system(), action, outcome)
            .with_subject(scope_subject(scope, None))
            .with_matched_rules([decision.rule_label()]);
        if let Some((_, policy_id)) = resolved.layers.last() {
            event = event.with_policy_ref(policy_id.clone());
        }
        self.audit.append(event).await?;

        Ok(decision)
    }

    /// Full gate: scope and runtime checks, then the resolved decision
    ///
    /// # Errors
    /// `Blocked` if any check or the decision refuses the action; reference
    /// errors from resolution; `Store` or `Audit` on persistence failure.
    pub async fn authorize(&self, scope: &ScopeRef, service: &str, action: &str) -> OpsResult<Decision> {
        let check = self.check(service, scope.team_id.as_deref(), action).await?;
        let subject = scope_subject(scope, Some(service));

        if let Some(reason) = check.blocked {
            let mut event = AuditEvent::new(Actor::system(), action, Outcome::Blocked)
                .with_subject(subject)
                .with_matched_rules(check.matched_rules);
            if let Some(policy_ref) = check.policy_ref {
                event = event.with_policy_ref(policy_ref);
            }
            self.audit.append(event).await?;
            tracing::warn!("Blocked {} on {}: {}", action, service, reason);
            return Err(OpsError::blocked(action, reason));
        }

        let resolved = self.resolver.resolve(scope).await?;
        let decision = resolved.decide(action, self.config.default_decision);
        let outcome = if decision.is_allowed() {
            Outcome::Allowed
        } else {
            Outcome::Blocked
        };

        let mut rules = check.matched_rules;
        rules.push(decision.rule_label());
        let mut event = AuditEvent::new(Actor::system(), action, outcome)
            .with_subject(subject)
            .with_matched_rules(rules);
        if let Some((_, policy_id)) = resolved.layers.last() {
            event = event.with_policy_ref(policy_id.clone());
        }
        self.audit.append(event).await?;

        if decision.is_allowed() {
            Ok(decision)
        } else {
            tracing::warn!("Denied {} for org {}: {}", action, scope.org_id, decision.rule_label());
            Err(OpsError::blocked(action, decision.rule_label()))
        }
    }

    async fn check(&self, service: &str, team_id: Option<&str>, action: &str) -> OpsResult<Check> {
        let policy: Option<Policy> = self
            .cache
            .try_cached(
                &policy_cache_key(&self.config.policy_id),
                self.cache.default_ttl(),
                || self.store.load(collections::POLICIES, &self.config.policy_id),
            )
            .await?;
        let Some(policy) = policy else {
            tracing::warn!("Policy {} missing, allowing by default", self.config.policy_id);
            return Ok(Check::allowed(Some("policy.missing"), None));
        };
        let policy_ref = Some(policy.policy_id.clone());

        if !policy.scope.covers_service(service) {
            tracing::info!("Service {} is outside the policy scope", service);
            return Ok(Check::allowed(Some("scope.services"), policy_ref));
        }
        if let Some(team) = team_id {
            if !policy.scope.covers_team(team) {
                return Ok(Check::blocked(
                    format!("team_not_in_scope:{team}"),
                    "scope.teams",
                    policy_ref,
                ));
            }
        }

        let ops: RuntimeOps = self
            .store
            .load(collections::RUNTIME_OPS, &self.config.runtime_scope)
            .await?
            .unwrap_or_default();
        if ops.is_disabled(action) {
            return Ok(Check::blocked(
                format!("action_blocked:{action}"),
                "runtimeOps.disabled",
                policy_ref,
            ));
        }

        Ok(Check::allowed(None, policy_ref))
    }
}

fn scope_subject(scope: &ScopeRef, service: Option<&str>) -> Subject {
    Subject {
        org_id: Some(scope.org_id.clone()),
        tenant_id: scope.tenant_id.clone(),
        team_id: scope.team_id.clone(),
        service: service.map(String::from),
        policy_id: None,
    }
}
