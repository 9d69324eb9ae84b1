//! Threshold rules
//!
//! A rule reads "when `metric` `operator` `threshold`, apply `action`". The
//! operator and action vocabularies are closed enums, so evaluation and
//! effect application are exhaustive matches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use vigil_core::{AlertChannels, Metric, Severity};

/// Job scheduled by `tune_system` when the policy names none
pub const DEFAULT_TUNING_JOB: &str = "tuningLoop";

/// Wildcard entry meaning "every action"
pub const WILDCARD: &str = "*";

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `==`
    #[serde(rename = "==")]
    Eq,
}

impl Operator {
    /// Symbol as written in policy documents
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
        }
    }

    /// Apply `observed op threshold`
    #[must_use]
    pub fn compare(self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => observed < threshold,
            Self::Gt => observed > threshold,
            Self::Le => observed <= threshold,
            Self::Ge => observed >= threshold,
            Self::Eq => {
                let scale = observed.abs().max(threshold.abs()).max(1.0);
                (observed - threshold).abs() <= f64::EPSILON * scale
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// What a matching rule does
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Send a notification
    Alert,
    /// Disable the policy's risky intent set
    BlockRiskyOps,
    /// Schedule a tuning job
    TuneSystem,
    /// Disable every action
    BlockAll,
    /// Page humans on every channel
    Escalate,
}

impl ActionKind {
    /// Name as written in policy documents
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::BlockRiskyOps => "block_risky_ops",
            Self::TuneSystem => "tune_system",
            Self::BlockAll => "block_all",
            Self::Escalate => "escalate",
        }
    }

    /// Severity contributed by this action
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::BlockAll | Self::Escalate => Severity::Critical,
            Self::BlockRiskyOps => Severity::High,
            Self::Alert | Self::TuneSystem => Severity::Medium,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One threshold rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Metric read from the daily document
    pub metric: Metric,
    /// Comparison
    pub operator: Operator,
    /// Threshold
    #[serde(rename = "value", alias = "threshold")]
    pub threshold: f64,
    /// Action applied on match
    pub action: ActionKind,
}

impl Rule {
    /// Create rule
    #[must_use]
    pub fn new(
        metric: impl Into<Metric>,
        operator: Operator,
        threshold: f64,
        action: ActionKind,
    ) -> Self {
        Self {
            metric: metric.into(),
            operator,
            threshold,
            action,
        }
    }

    /// Check an observed value against the rule
    #[inline]
    #[must_use]
    pub fn matches(&self, observed: f64) -> bool {
        self.operator.compare(observed, self.threshold)
    }

    /// Condition only, e.g. `passRate < 0.9`
    #[must_use]
    pub fn condition(&self) -> String {
        format!("{} {} {}", self.metric, self.operator, self.threshold)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.condition(), self.action)
    }
}

/// Settings for `block_risky_ops`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockRiskyOps {
    /// Intents disabled while the rule matches
    pub disable_intent: BTreeSet<String>,
}

/// Settings for `tune_system`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneSystem {
    /// Job to schedule
    pub invoke: Option<String>,
}

impl TuneSystem {
    /// Job to schedule, falling back to the default tuning loop
    #[must_use]
    pub fn job(&self) -> &str {
        self.invoke.as_deref().unwrap_or(DEFAULT_TUNING_JOB)
    }
}

/// Per-action effect settings of a policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionEffects {
    /// Channels for `alert`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertChannels>,
    /// Intent set for `block_risky_ops`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_risky_ops: Option<BlockRiskyOps>,
    /// Job for `tune_system`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tune_system: Option<TuneSystem>,
}

impl ActionEffects {
    /// Intents disabled by `block_risky_ops`
    #[must_use]
    pub fn risky_intents(&self) -> BTreeSet<String> {
        self.block_risky_ops
            .as_ref()
            .map(|b| b.disable_intent.clone())
            .unwrap_or_default()
    }

    /// Alert channels, none when unset
    #[must_use]
    pub fn alert_channels(&self) -> AlertChannels {
        self.alert.unwrap_or_default()
    }

    /// Job for `tune_system`
    #[must_use]
    pub fn tuning_job(&self) -> &str {
        self.tune_system
            .as_ref()
            .map_or(DEFAULT_TUNING_JOB, TuneSystem::job)
    }

    /// Overlay `child` on `self`
    ///
    /// Channel and job settings are replaced when the child sets them; the
    /// risky intent sets are unioned so a child can only block more.
    #[must_use]
    pub fn merged_with(&self, child: &ActionEffects) -> ActionEffects {
        let block_risky_ops = match (&self.block_risky_ops, &child.block_risky_ops) {
            (None, None) => None,
            (base, over) => {
                let mut intents = base
                    .as_ref()
                    .map(|b| b.disable_intent.clone())
                    .unwrap_or_default();
                if let Some(over) = over {
                    intents.extend(over.disable_intent.iter().cloned());
                }
                Some(BlockRiskyOps {
                    disable_intent: intents,
                })
            }
        };
        ActionEffects {
            alert: child.alert.or(self.alert),
            block_risky_ops,
            tune_system: child.tune_system.clone().or_else(|| self.tune_system.clone()),
        }
    }
}
