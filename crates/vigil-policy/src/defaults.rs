//! Built-in governance policy

use crate::policy::Policy;
use crate::rule::{ActionEffects, ActionKind, BlockRiskyOps, Operator, Rule, TuneSystem};
use vigil_core::{AlertChannels, Metric};

/// Id of the built-in policy
pub const DEFAULT_POLICY_ID: &str = "default-governance";

/// Policy written by `init`
///
/// | rule                       | action            |
/// |----------------------------|-------------------|
/// | `passRate < 0.9`           | `alert`           |
/// | `copilotReliability < 0.85`| `alert`           |
/// | `regressionCount > 3`      | `block_risky_ops` |
/// | `avgLatency > 500`         | `tune_system`     |
/// | `passRate < 0.7`           | `block_all`       |
/// | `regressionCount > 10`     | `block_all`       |
#[must_use]
pub fn default_governance_policy() -> Policy {
    Policy::new(DEFAULT_POLICY_ID)
        .with_rule(Rule::new(Metric::PassRate, Operator::Lt, 0.9, ActionKind::Alert))
        .with_rule(Rule::new(Metric::Reliability, Operator::Lt, 0.85, ActionKind::Alert))
        .with_rule(Rule::new(
            Metric::RegressionCount,
            Operator::Gt,
            3.0,
            ActionKind::BlockRiskyOps,
        ))
        .with_rule(Rule::new(Metric::AvgLatency, Operator::Gt, 500.0, ActionKind::TuneSystem))
        .with_rule(Rule::new(Metric::PassRate, Operator::Lt, 0.7, ActionKind::BlockAll))
        .with_rule(Rule::new(
            Metric::RegressionCount,
            Operator::Gt,
            10.0,
            ActionKind::BlockAll,
        ))
        .with_actions(ActionEffects {
            alert: Some(AlertChannels {
                notify_slack: true,
                notify_email: true,
            }),
            block_risky_ops: Some(BlockRiskyOps {
                disable_intent: ["retuning", "deploy_model", "bulk_alert"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            }),
            tune_system: Some(TuneSystem {
                invoke: Some("tuningLoop".to_string()),
            }),
        })
}
