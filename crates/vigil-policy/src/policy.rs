//! Policy documents

use crate::rule::{ActionEffects, Rule, WILDCARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Services and teams a policy governs
///
/// An empty list means "everything"; `*` in a list also matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyScope {
    /// Governed services
    pub services: Vec<String>,
    /// Governed teams
    pub teams: Vec<String>,
}

impl PolicyScope {
    /// Check if the scope sets neither list
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.teams.is_empty()
    }

    /// Check if a service is governed
    #[must_use]
    pub fn covers_service(&self, service: &str) -> bool {
        Self::covers(&self.services, service)
    }

    /// Check if a team is governed
    #[must_use]
    pub fn covers_team(&self, team_id: &str) -> bool {
        Self::covers(&self.teams, team_id)
    }

    fn covers(list: &[String], item: &str) -> bool {
        list.is_empty() || list.iter().any(|s| s == WILDCARD || s == item)
    }
}

/// Governance policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Document id
    pub policy_id: String,
    /// Free-form version label
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    /// Threshold rules in declaration order
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Per-action effect settings
    #[serde(default)]
    pub actions: ActionEffects,
    /// Explicitly permitted actions
    #[serde(default)]
    pub allow: BTreeSet<String>,
    /// Explicitly forbidden actions
    #[serde(default)]
    pub deny: BTreeSet<String>,
    /// Governed services and teams
    #[serde(default, skip_serializing_if = "PolicyScope::is_empty")]
    pub scope: PolicyScope,
    /// Plan forced by a tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_override: Option<String>,
    /// When the document was compiled from source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_at: Option<DateTime<Utc>>,
    /// Who compiled it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_by: Option<String>,
    /// Any other fields
    #[serde(default, flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl Policy {
    /// Create an empty policy
    #[must_use]
    pub fn new(policy_id: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            version: None,
            rules: Vec::new(),
            actions: ActionEffects::default(),
            allow: BTreeSet::new(),
            deny: BTreeSet::new(),
            scope: PolicyScope::default(),
            plan_override: None,
            compiled_at: None,
            compiled_by: None,
            attributes: BTreeMap::new(),
        }
    }

    /// With a rule appended
    #[must_use]
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// With effect settings
    #[must_use]
    pub fn with_actions(mut self, actions: ActionEffects) -> Self {
        self.actions = actions;
        self
    }

    /// With allowed actions
    #[must_use]
    pub fn allowing<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow.extend(actions.into_iter().map(Into::into));
        self
    }

    /// With denied actions
    #[must_use]
    pub fn denying<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny.extend(actions.into_iter().map(Into::into));
        self
    }

    /// With a version label
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Overlay a child scope's policy
    ///
    /// `allow` and `deny` are unioned, so nothing an ancestor denies can be
    /// lifted. Rules are appended (a child only adds rules). Every other
    /// field the child sets replaces the base value.
    #[must_use]
    pub fn merged_with(&self, child: &Policy) -> Policy {
        let mut rules = self.rules.clone();
        for rule in &child.rules {
            if !rules.contains(rule) {
                rules.push(rule.clone());
            }
        }
        let mut attributes = self.attributes.clone();
        attributes.extend(child.attributes.clone());

        Policy {
            policy_id: child.policy_id.clone(),
            version: child.version.clone().or_else(|| self.version.clone()),
            rules,
            actions: self.actions.merged_with(&child.actions),
            allow: self.allow.union(&child.allow).cloned().collect(),
            deny: self.deny.union(&child.deny).cloned().collect(),
            scope: if child.scope.is_empty() {
                self.scope.clone()
            } else {
                child.scope.clone()
            },
            plan_override: child
                .plan_override
                .clone()
                .or_else(|| self.plan_override.clone()),
            compiled_at: child.compiled_at.or(self.compiled_at),
            compiled_by: child
                .compiled_by
                .clone()
                .or_else(|| self.compiled_by.clone()),
            attributes,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
