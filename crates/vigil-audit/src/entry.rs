//! Audit entries
//!
//! An [`AuditEvent`] is what a decision point reports. The log seals it into
//! an [`AuditEntry`] by assigning an id and timestamp and linking it to the
//! previous entry's hash.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use vigil_core::AuditId;

/// `prev_hash` of the first entry in a chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Who performed the action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User or service id
    pub uid: String,
    /// Role, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Actor {
    /// Actor for scheduled jobs and internal gates
    #[must_use]
    pub fn system() -> Self {
        Self {
            uid: "system".to_string(),
            role: Some("system".to_string()),
        }
    }

    /// Named user without a role
    #[must_use]
    pub fn user(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            role: None,
        }
    }

    /// With role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// What the action was applied to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subject {
    /// Org id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Tenant id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Team id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// Service name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Policy id the action concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
}

impl Subject {
    /// Subject naming a policy
    #[must_use]
    pub fn policy(policy_id: impl Into<String>) -> Self {
        Self {
            policy_id: Some(policy_id.into()),
            ..Self::default()
        }
    }

    /// Subject naming a service, optionally within a team
    #[must_use]
    pub fn service(service: impl Into<String>, team_id: Option<String>) -> Self {
        Self {
            service: Some(service.into()),
            team_id,
            ..Self::default()
        }
    }
}

/// Model involved in a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Model name
    pub name: String,
    /// Model version; joins to the model card collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Links to related records
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditLinks {
    /// Knowledge graph node ids
    pub kg_nodes: Vec<String>,
}

impl AuditLinks {
    fn is_empty(&self) -> bool {
        self.kg_nodes.is_empty()
    }
}

/// Result of the audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Gate let the action through
    Allowed,
    /// Gate refused the action
    Blocked,
    /// Job or write completed
    Applied,
    /// Job or write failed
    Failed,
}

impl Outcome {
    /// Stable name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Blocked => "blocked",
            Self::Applied => "applied",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision report, before sealing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Who
    pub actor: Actor,
    /// On what
    pub subject: Subject,
    /// Action name, e.g. `policy_compile`
    pub action: String,
    /// Rules that decided the outcome
    pub matched_rules: Vec<String>,
    /// Model involved
    pub model: Option<ModelRef>,
    /// Policy consulted
    pub policy_ref: Option<String>,
    /// Result
    pub outcome: Outcome,
    /// Related records
    pub links: AuditLinks,
}

impl AuditEvent {
    /// Create event
    #[must_use]
    pub fn new(actor: Actor, action: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            actor,
            subject: Subject::default(),
            action: action.into(),
            matched_rules: Vec::new(),
            model: None,
            policy_ref: None,
            outcome,
            links: AuditLinks::default(),
        }
    }

    /// With subject
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    /// With matched rules
    #[must_use]
    pub fn with_matched_rules<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matched_rules.extend(rules.into_iter().map(Into::into));
        self
    }

    /// With model
    #[must_use]
    pub fn with_model(mut self, name: impl Into<String>, version: Option<String>) -> Self {
        self.model = Some(ModelRef {
            name: name.into(),
            version,
        });
        self
    }

    /// With policy reference
    #[must_use]
    pub fn with_policy_ref(mut self, policy_ref: impl Into<String>) -> Self {
        self.policy_ref = Some(policy_ref.into());
        self
    }

    /// With linked graph nodes
    #[must_use]
    pub fn with_kg_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.links.kg_nodes.extend(nodes.into_iter().map(Into::into));
        self
    }
}

/// Immutable, sealed audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Entry id; also the store key
    pub id: AuditId,
    /// When the entry was sealed
    pub timestamp: DateTime<Utc>,
    /// Who
    pub actor: Actor,
    /// On what
    #[serde(default)]
    pub subject: Subject,
    /// Action name
    pub action: String,
    /// Rules that decided the outcome
    #[serde(default)]
    pub matched_rules: Vec<String>,
    /// Model involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    /// Policy consulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_ref: Option<String>,
    /// Result
    pub outcome: Outcome,
    /// Related records
    #[serde(default, skip_serializing_if = "AuditLinks::is_empty")]
    pub links: AuditLinks,
    /// Hash of the previous entry, hex
    pub prev_hash: String,
    /// Hash of this entry, hex
    pub hash: String,
}

impl AuditEntry {
    /// Seal an event
    #[must_use]
    pub fn seal(event: AuditEvent, id: AuditId, timestamp: DateTime<Utc>, prev_hash: String) -> Self {
        let mut entry = Self {
            id,
            timestamp,
            actor: event.actor,
            subject: event.subject,
            action: event.action,
            matched_rules: event.matched_rules,
            model: event.model,
            policy_ref: event.policy_ref,
            outcome: event.outcome,
            links: event.links,
            prev_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }

    /// Hash of the entry's content and `prev_hash`, hex
    ///
    /// The stored `hash` field itself is not part of the input.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        fn field(hasher: &mut Sha256, value: &str) {
            hasher.update(value.as_bytes());
            hasher.update([0]);
        }
        fn optional(hasher: &mut Sha256, value: Option<&str>) {
            match value {
                Some(v) => {
                    hasher.update([1]);
                    field(hasher, v);
                }
                None => hasher.update([0]),
            }
        }

        let mut hasher = Sha256::new();
        field(&mut hasher, &self.id.to_string());
        field(
            &mut hasher,
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        );
        field(&mut hasher, &self.actor.uid);
        optional(&mut hasher, self.actor.role.as_deref());
        for part in [
            &self.subject.org_id,
            &self.subject.tenant_id,
            &self.subject.team_id,
            &self.subject.service,
            &self.subject.policy_id,
        ] {
            optional(&mut hasher, part.as_deref());
        }
        field(&mut hasher, &self.action);
        hasher.update((self.matched_rules.len() as u64).to_le_bytes());
        for rule in &self.matched_rules {
            field(&mut hasher, rule);
        }
        optional(&mut hasher, self.model.as_ref().map(|m| m.name.as_str()));
        optional(
            &mut hasher,
            self.model.as_ref().and_then(|m| m.version.as_deref()),
        );
        optional(&mut hasher, self.policy_ref.as_deref());
        field(&mut hasher, self.outcome.as_str());
        hasher.update((self.links.kg_nodes.len() as u64).to_le_bytes());
        for node in &self.links.kg_nodes {
            field(&mut hasher, node);
        }
        field(&mut hasher, &self.prev_hash);
        hex::encode(hasher.finalize())
    }
}
