//! Rule evaluation
//!
//! `evaluate` is a pure function of a policy, a metrics document and the
//! current time. It returns the new runtime-ops document and the side
//! effects to perform; a driver executes them.
//!
//! Every rule is checked in declaration order and all matches apply. The
//! disabled set is rebuilt from the matches alone, so a rule that stops
//! matching releases what it had blocked. A rule naming a metric the
//! document lacks is skipped with a warning.

use crate::policy::Policy;
use crate::rule::{ActionKind, Rule, WILDCARD};
use crate::runtime::RuntimeOps;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use vigil_core::{AlertChannels, DailyMetrics, Notification, Severity};

/// A rule that matched
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    /// Position in the policy
    pub index: usize,
    /// The rule
    pub rule: Rule,
    /// Value read from the metrics document
    pub observed: f64,
}

impl RuleMatch {
    /// Bullet line used in alert text
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "• {} (current: {}) → {}",
            self.rule.condition(),
            self.observed,
            self.rule.action
        )
    }
}

/// A rule that could not be evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRule {
    /// Position in the policy
    pub index: usize,
    /// The rule
    pub rule: Rule,
}

/// Side effect requested by an evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Deliver a notification
    Notify(Notification),
    /// Schedule a follow-up job
    ScheduleJob {
        /// Job name
        job: String,
    },
}

/// Result of evaluating a policy against one metrics document
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Policy evaluated
    pub policy_id: String,
    /// Day of the metrics document
    pub metrics_date: NaiveDate,
    /// When the evaluation ran
    pub evaluated_at: DateTime<Utc>,
    /// Matching rules, in declaration order
    pub matched: Vec<RuleMatch>,
    /// Rules skipped for a missing metric
    pub skipped: Vec<SkippedRule>,
    /// Recomputed runtime ops
    pub runtime_ops: RuntimeOps,
    /// Side effects, notifications first
    pub effects: Vec<Effect>,
    /// Highest severity among matched actions
    pub severity: Option<Severity>,
}

impl Evaluation {
    /// Check if any rule matched
    #[inline]
    #[must_use]
    pub fn triggered(&self) -> bool {
        !self.matched.is_empty()
    }

    /// Distinct matched actions
    #[must_use]
    pub fn actions(&self) -> BTreeSet<ActionKind> {
        self.matched.iter().map(|m| m.rule.action).collect()
    }

    /// Matched rules as labels, e.g. `passRate < 0.9 → alert`
    #[must_use]
    pub fn matched_labels(&self) -> Vec<String> {
        self.matched.iter().map(|m| m.rule.to_string()).collect()
    }

    /// Alert text listing every matched rule; `None` when nothing matched
    #[must_use]
    pub fn alert_text(&self) -> Option<String> {
        if self.matched.is_empty() {
            return None;
        }
        let mut text = format!(
            "Governance Alert\nDate: {}\nTriggered rules:",
            self.metrics_date
        );
        for m in &self.matched {
            let _ = write!(text, "\n{}", m.describe());
        }
        Some(text)
    }
}

/// Evaluate `policy` against `metrics`
#[must_use]
pub fn evaluate(policy: &Policy, metrics: &DailyMetrics, now: DateTime<Utc>) -> Evaluation {
    let mut matched = Vec::new();
    let mut skipped = Vec::new();

    for (index, rule) in policy.rules.iter().enumerate() {
        match metrics.value(&rule.metric) {
            Some(observed) if rule.matches(observed) => {
                tracing::warn!(
                    "Rule triggered: {} (current: {}) → {}",
                    rule.condition(),
                    observed,
                    rule.action
                );
                matched.push(RuleMatch {
                    index,
                    rule: rule.clone(),
                    observed,
                });
            }
            Some(_) => {}
            None => {
                tracing::warn!(
                    "Rule {} skipped: metric {} missing from {}",
                    index,
                    rule.metric,
                    metrics.date
                );
                skipped.push(SkippedRule {
                    index,
                    rule: rule.clone(),
                });
            }
        }
    }

    let actions: BTreeSet<ActionKind> = matched.iter().map(|m| m.rule.action).collect();
    let severity = actions.iter().map(|a| a.severity()).max();
    let runtime_ops = runtime_ops(policy, metrics.date, &matched, &actions, now);

    let mut evaluation = Evaluation {
        policy_id: policy.policy_id.clone(),
        metrics_date: metrics.date,
        evaluated_at: now,
        matched,
        skipped,
        runtime_ops,
        effects: Vec::new(),
        severity,
    };
    evaluation.effects = effects(policy, &evaluation, &actions);
    evaluation
}

fn runtime_ops(
    policy: &Policy,
    date: NaiveDate,
    matched: &[RuleMatch],
    actions: &BTreeSet<ActionKind>,
    now: DateTime<Utc>,
) -> RuntimeOps {
    let mut disabled = BTreeSet::new();
    if actions.contains(&ActionKind::BlockRiskyOps) {
        disabled.extend(policy.actions.risky_intents());
    }
    if actions.contains(&ActionKind::BlockAll) {
        disabled.insert(WILDCARD.to_string());
    }

    let blocking: Vec<String> = matched
        .iter()
        .filter(|m| matches!(m.rule.action, ActionKind::BlockRiskyOps | ActionKind::BlockAll))
        .map(|m| m.rule.condition())
        .collect();
    let reason = (!blocking.is_empty())
        .then(|| format!("Governance policy {}: {}", policy.policy_id, blocking.join(", ")));

    RuntimeOps {
        disabled,
        reason,
        updated_at: Some(now),
        source_policy: Some(policy.policy_id.clone()),
        metrics_date: Some(date),
    }
}

fn effects(policy: &Policy, evaluation: &Evaluation, actions: &BTreeSet<ActionKind>) -> Vec<Effect> {
    let mut effects = Vec::new();

    let notify = actions.contains(&ActionKind::Alert) || actions.contains(&ActionKind::Escalate);
    if let (true, Some(text), Some(severity)) =
        (notify, evaluation.alert_text(), evaluation.severity)
    {
        let channels = if actions.contains(&ActionKind::Escalate) {
            AlertChannels {
                notify_slack: true,
                notify_email: true,
            }
        } else {
            policy.actions.alert_channels()
        };
        effects.push(Effect::Notify(Notification {
            severity,
            text,
            channels,
        }));
    }

    if actions.contains(&ActionKind::TuneSystem) {
        effects.push(Effect::ScheduleJob {
            job: policy.actions.tuning_job().to_string(),
        });
    }

    effects
}
