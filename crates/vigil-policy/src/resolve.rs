//! Org → tenant → team policy resolution
//!
//! # Algorithm
//!
//! 1. Load the org (`OrgNotFound` if absent) and its policy.
//! 2. If a tenant is named, load it (`TenantNotFound`), check it belongs
//!    to the org (`TenantOrgMismatch`) and overlay its policy and plan.
//! 3. If a team is named, load it (`TeamNotFound`), check its org
//!    (`TeamOrgMismatch`) and, when a tenant was named, its tenant
//!    (`TeamTenantMismatch`), then overlay its policy.
//!
//! A scope whose `policyRef` points at a missing policy contributes nothing.
//!
//! # Decisions
//!
//! An action is denied if any layer denies it (or denies `*`); otherwise it
//! is allowed if any layer allows it (or allows `*`); otherwise the
//! configured default applies. Deny therefore wins at any depth.

use crate::error::{PolicyError, PolicyResult};
use crate::policy::Policy;
use crate::rule::WILDCARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use vigil_core::{collections, DefaultDecision, DocumentStore, StoreExt};

/// Organisation document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrgDoc {
    /// Display name
    pub name: Option<String>,
    /// Id of the org policy in the policies collection
    pub policy_ref: Option<String>,
}

/// Tenant document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDoc {
    /// Owning org
    pub org_id: String,
    /// Id of the tenant policy
    #[serde(default)]
    pub policy_ref: Option<String>,
    /// Plan forced on everything under the tenant
    #[serde(default)]
    pub plan_override: Option<String>,
}

/// Team document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDoc {
    /// Owning org
    pub org_id: String,
    /// Owning tenant, if the team sits under one
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Id of the team policy
    #[serde(default)]
    pub policy_ref: Option<String>,
}

/// Scope level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    /// Organisation
    Org,
    /// Tenant
    Tenant,
    /// Team
    Team,
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Org => "org",
            Self::Tenant => "tenant",
            Self::Team => "team",
        };
        f.write_str(s)
    }
}

/// Scope to resolve
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRef {
    /// Org id
    pub org_id: String,
    /// Tenant id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Team id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl ScopeRef {
    /// Org-level scope
    #[must_use]
    pub fn org(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            tenant_id: None,
            team_id: None,
        }
    }

    /// With tenant
    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// With team
    #[must_use]
    pub fn team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }
}

/// Outcome of an allow/deny decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Permitted
    Allow,
    /// Refused
    Deny,
}

/// Why a decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DecisionBasis {
    /// A layer denies the action
    Denied {
        /// Shallowest layer with the deny
        level: ScopeLevel,
    },
    /// A layer allows the action and none denies it
    Allowed {
        /// Shallowest layer with the allow
        level: ScopeLevel,
    },
    /// No layer mentions the action
    Default,
}

/// Allow/deny decision for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Action decided on
    pub action: String,
    /// Outcome
    pub verdict: Verdict,
    /// Reason
    pub basis: DecisionBasis,
}

impl Decision {
    /// Check if the action is permitted
    #[inline]
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    /// Matched-rule label for audit entries, e.g. `deny@org`
    #[must_use]
    pub fn rule_label(&self) -> String {
        match self.basis {
            DecisionBasis::Denied { level } => format!("deny@{level}"),
            DecisionBasis::Allowed { level } => format!("allow@{level}"),
            DecisionBasis::Default => "default".to_string(),
        }
    }
}

/// Effective policy for a scope
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPolicy {
    /// Merged policy document
    pub policy: Policy,
    /// Policies applied, shallowest first
    pub layers: Vec<(ScopeLevel, String)>,
    deny_origin: BTreeMap<String, ScopeLevel>,
    allow_origin: BTreeMap<String, ScopeLevel>,
}

impl ResolvedPolicy {
    /// Merge policy layers, shallowest first; `None` layers contribute nothing
    ///
    /// Returns `None` only when every layer is `None`.
    #[must_use]
    pub fn from_layers(layers: Vec<(ScopeLevel, Option<Policy>)>) -> Option<Self> {
        let mut merged: Option<Policy> = None;
        let mut applied = Vec::new();
        let mut deny_origin = BTreeMap::new();
        let mut allow_origin = BTreeMap::new();

        for (level, policy) in layers {
            let Some(policy) = policy else { continue };
            for action in &policy.deny {
                deny_origin.entry(action.clone()).or_insert(level);
            }
            for action in &policy.allow {
                allow_origin.entry(action.clone()).or_insert(level);
            }
            applied.push((level, policy.policy_id.clone()));
            merged = Some(match merged {
                Some(base) => base.merged_with(&policy),
                None => policy,
            });
        }

        merged.map(|policy| Self {
            policy,
            layers: applied,
            deny_origin,
            allow_origin,
        })
    }

    /// Empty resolution: nothing allowed or denied
    #[must_use]
    pub fn empty(policy_id: impl Into<String>) -> Self {
        Self {
            policy: Policy::new(policy_id),
            layers: Vec::new(),
            deny_origin: BTreeMap::new(),
            allow_origin: BTreeMap::new(),
        }
    }

    /// Decide on an action
    #[must_use]
    pub fn decide(&self, action: &str, default: DefaultDecision) -> Decision {
        let lookup = |origins: &BTreeMap<String, ScopeLevel>| {
            [origins.get(action), origins.get(WILDCARD)]
                .into_iter()
                .flatten()
                .min()
                .copied()
        };

        let (verdict, basis) = if let Some(level) = lookup(&self.deny_origin) {
            (Verdict::Deny, DecisionBasis::Denied { level })
        } else if let Some(level) = lookup(&self.allow_origin) {
            (Verdict::Allow, DecisionBasis::Allowed { level })
        } else {
            let verdict = match default {
                DefaultDecision::Allow => Verdict::Allow,
                DefaultDecision::Deny => Verdict::Deny,
            };
            (verdict, DecisionBasis::Default)
        };

        Decision {
            action: action.to_string(),
            verdict,
            basis,
        }
    }
}

/// Loads scope documents and resolves effective policies
#[derive(Clone)]
pub struct PolicyResolver {
    store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for PolicyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyResolver").finish_non_exhaustive()
    }
}

impl PolicyResolver {
    /// Create resolver over a store
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Resolve the effective policy for a scope
    ///
    /// A team always inherits its own tenant: when the scope names a team but
    /// no tenant, the team's tenant is loaded and layered between org and team.
    ///
    /// # Errors
    /// Reference errors for missing or mislinked scopes, `Store` on load failure.
    pub async fn resolve(&self, scope: &ScopeRef) -> PolicyResult<ResolvedPolicy> {
        let org: OrgDoc = self
            .store
            .load(collections::ORGS, &scope.org_id)
            .await?
            .ok_or_else(|| PolicyError::OrgNotFound {
                org_id: scope.org_id.clone(),
            })?;

        let team = match &scope.team_id {
            Some(team_id) => Some(self.team(scope, team_id).await?),
            None => None,
        };
        let tenant_id = scope
            .tenant_id
            .as_ref()
            .or_else(|| team.as_ref().and_then(|t| t.tenant_id.as_ref()));

        let mut layers = vec![(ScopeLevel::Org, self.policy(org.policy_ref.as_deref()).await?)];
        let mut plan_override = None;

        if let Some(tenant_id) = tenant_id {
            let tenant = self.tenant(scope, tenant_id).await?;
            layers.push((
                ScopeLevel::Tenant,
                self.policy(tenant.policy_ref.as_deref()).await?,
            ));
            plan_override = tenant.plan_override;
        }

        if let Some(team) = &team {
            layers.push((
                ScopeLevel::Team,
                self.policy(team.policy_ref.as_deref()).await?,
            ));
        }

        let mut resolved = ResolvedPolicy::from_layers(layers)
            .unwrap_or_else(|| ResolvedPolicy::empty(scope.org_id.clone()));
        if plan_override.is_some() {
            resolved.policy.plan_override = plan_override;
        }
        tracing::debug!(
            "Resolved policy for org {} with {} layers",
            scope.org_id,
            resolved.layers.len()
        );
        Ok(resolved)
    }

    async fn tenant(&self, scope: &ScopeRef, tenant_id: &str) -> PolicyResult<TenantDoc> {
        let tenant: TenantDoc = self
            .store
            .load(collections::TENANTS, tenant_id)
            .await?
            .ok_or_else(|| PolicyError::TenantNotFound {
                tenant_id: tenant_id.to_string(),
            })?;
        if tenant.org_id != scope.org_id {
            return Err(PolicyError::TenantOrgMismatch {
                tenant_id: tenant_id.to_string(),
                expected: scope.org_id.clone(),
                actual: tenant.org_id,
            });
        }
        Ok(tenant)
    }

    async fn team(&self, scope: &ScopeRef, team_id: &str) -> PolicyResult<TeamDoc> {
        let team: TeamDoc = self
            .store
            .load(collections::TEAMS, team_id)
            .await?
            .ok_or_else(|| PolicyError::TeamNotFound {
                team_id: team_id.to_string(),
            })?;
        if team.org_id != scope.org_id {
            return Err(PolicyError::TeamOrgMismatch {
                team_id: team_id.to_string(),
                expected: scope.org_id.clone(),
                actual: team.org_id,
            });
        }
        if let Some(tenant_id) = &scope.tenant_id {
            if team.tenant_id.as_deref() != Some(tenant_id.as_str()) {
                return Err(PolicyError::TeamTenantMismatch {
                    team_id: team_id.to_string(),
                    expected: tenant_id.clone(),
                    actual: team.tenant_id,
                });
            }
        }
        Ok(team)
    }

    async fn policy(&self, policy_ref: Option<&str>) -> PolicyResult<Option<Policy>> {
        let Some(id) = policy_ref else {
            return Ok(None);
        };
        let policy: Option<Policy> = self.store.load(collections::POLICIES, id).await?;
        if policy.is_none() {
            tracing::warn!("Policy {} referenced by scope does not exist", id);
        }
        Ok(policy)
    }
}
