//! Decision explanations
//!
//! `explain` re-reads a stored entry and turns it into a "why" list. Joins
//! to the model card and the referenced policy are best effort: a missing or
//! unreadable target leaves the field empty.

use crate::entry::{Actor, AuditEntry, AuditLinks, ModelRef, Outcome, Subject};
use crate::error::AuditResult;
use crate::log::AuditLog;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use vigil_core::{collections, AuditId};

/// Explanation of one audited decision
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainReport {
    /// Entry id
    pub log_id: AuditId,
    /// Action taken
    pub action: String,
    /// Who
    pub actor: Actor,
    /// On what
    pub subject: Subject,
    /// When
    pub when: DateTime<Utc>,
    /// Result
    pub outcome: Outcome,
    /// Human-readable reasons, see [`why_chain`]
    pub why: Vec<String>,
    /// Model involved
    pub model: Option<ModelRef>,
    /// Model card for the model version, if one is stored
    pub model_card: Option<Value>,
    /// Current document of the referenced policy
    pub policy: Option<Value>,
    /// Related records
    pub links: AuditLinks,
    /// Chain hashes of the entry
    pub integrity: Integrity,
}

/// Chain position of an explained entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Integrity {
    /// Predecessor hash
    pub prev_hash: String,
    /// Entry hash
    pub hash: String,
}

/// Outcome of an explain query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Explanation {
    /// No entry with that id
    NotFound {
        /// Requested id
        log_id: String,
    },
    /// Entry found
    Found(Box<ExplainReport>),
}

impl Explanation {
    /// Report, if found
    #[must_use]
    pub fn report(&self) -> Option<&ExplainReport> {
        match self {
            Self::Found(report) => Some(report),
            Self::NotFound { .. } => None,
        }
    }
}

/// Reasons behind an entry, in a fixed order
#[must_use]
pub fn why_chain(entry: &AuditEntry) -> Vec<String> {
    let mut why = Vec::new();
    if !entry.matched_rules.is_empty() {
        why.push(format!("Policy match: {}", entry.matched_rules.join(", ")));
    }
    if !entry.links.kg_nodes.is_empty() {
        why.push(format!("Linked graph nodes: {}", entry.links.kg_nodes.len()));
    }
    if let Some(model) = &entry.model {
        why.push(format!(
            "Model: {} (v{})",
            model.name,
            model.version.as_deref().unwrap_or("unknown")
        ));
    }
    why.push(format!("Action: {}", entry.action));
    why
}

impl AuditLog {
    /// Explain a stored decision
    ///
    /// # Errors
    /// `Store` if the entry itself cannot be read; join failures are not errors.
    pub async fn explain(&self, log_id: &str) -> AuditResult<Explanation> {
        let Some(entry) = self.get(log_id).await? else {
            tracing::debug!("Explain: no audit entry {}", log_id);
            return Ok(Explanation::NotFound {
                log_id: log_id.to_string(),
            });
        };

        let model_card = match entry.model.as_ref().and_then(|m| m.version.as_deref()) {
            Some(version) => self.join(collections::MODEL_CARDS, version).await,
            None => None,
        };
        let policy = match entry
            .policy_ref
            .as_deref()
            .or(entry.subject.policy_id.as_deref())
        {
            Some(policy_id) => self.join(collections::POLICIES, policy_id).await,
            None => None,
        };

        let why = why_chain(&entry);
        Ok(Explanation::Found(Box::new(ExplainReport {
            log_id: entry.id,
            action: entry.action,
            actor: entry.actor,
            subject: entry.subject,
            when: entry.timestamp,
            outcome: entry.outcome,
            why,
            model: entry.model,
            model_card,
            policy,
            links: entry.links,
            integrity: Integrity {
                prev_hash: entry.prev_hash,
                hash: entry.hash,
            },
        })))
    }

    async fn join(&self, collection: &str, key: &str) -> Option<Value> {
        match self.store().get(collection, key).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("Explain join {}/{} failed: {}", collection, key, e);
                None
            }
        }
    }
}
