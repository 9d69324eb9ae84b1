//! Governance alert records

use crate::evaluate::Evaluation;
use crate::rule::{ActionKind, Operator};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::{AlertId, Metric, Severity};

/// One triggered rule with the value that triggered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredRule {
    /// Metric
    pub metric: Metric,
    /// Comparison
    pub operator: Operator,
    /// Threshold
    pub value: f64,
    /// Observed value
    pub current_value: f64,
    /// Action applied
    pub action: ActionKind,
}

/// Stored record of an evaluation that matched at least one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    /// Record id
    pub id: AlertId,
    /// When the evaluation ran
    pub created_at: DateTime<Utc>,
    /// Record kind, always `governance`
    #[serde(rename = "type")]
    pub kind: String,
    /// Highest matched severity
    pub severity: Severity,
    /// Alert text
    pub message: String,
    /// Matched rules
    pub rules_triggered: Vec<TriggeredRule>,
    /// Metrics day evaluated
    pub governance_date: NaiveDate,
    /// Set by operators once handled
    pub resolved: bool,
}

impl AlertRecord {
    /// Build the record for an evaluation; `None` when nothing matched
    #[must_use]
    pub fn from_evaluation(evaluation: &Evaluation) -> Option<Self> {
        let severity = evaluation.severity?;
        let message = evaluation.alert_text()?;
        Some(Self {
            id: AlertId::at(evaluation.evaluated_at),
            created_at: evaluation.evaluated_at,
            kind: "governance".to_string(),
            severity,
            message,
            rules_triggered: evaluation
                .matched
                .iter()
                .map(|m| TriggeredRule {
                    metric: m.rule.metric.clone(),
                    operator: m.rule.operator,
                    value: m.rule.threshold,
                    current_value: m.observed,
                    action: m.rule.action,
                })
                .collect(),
            governance_date: evaluation.metrics_date,
            resolved: false,
        })
    }
}
