//! Vigil Policy
//!
//! Cascading governance policies:
//!
//! - **Rules**: closed vocabulary of metrics, operators and actions
//! - **Resolution**: org → tenant → team overlay where deny always wins
//! - **Evaluation**: pure `(policy, metrics, now) -> Evaluation` producing the
//!   recomputed [`RuntimeOps`] and the side effects to run
//! - **Compilation**: YAML policy sources into stored documents
//!
//! # Architecture
//!
//! ```text
//! orgs / tenants / teams ─→ PolicyResolver ─→ ResolvedPolicy::decide(action)
//!
//! Policy + DailyMetrics ─→ evaluate() ─→ Evaluation
//!                                          ├─ runtime_ops (whole document)
//!                                          ├─ effects (notify, schedule job)
//!                                          └─ AlertRecord
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod alert;
pub mod compiler;
pub mod defaults;
pub mod error;
pub mod evaluate;
pub mod policy;
pub mod resolve;
pub mod rule;
pub mod runtime;

pub use alert::{AlertRecord, TriggeredRule};
pub use compiler::compile_policy;
pub use defaults::{default_governance_policy, DEFAULT_POLICY_ID};
pub use error::{PolicyError, PolicyResult};
pub use evaluate::{evaluate, Effect, Evaluation, RuleMatch, SkippedRule};
pub use policy::{Policy, PolicyScope};
pub use resolve::{
    Decision, DecisionBasis, OrgDoc, PolicyResolver, ResolvedPolicy, ScopeLevel, ScopeRef,
    TeamDoc, TenantDoc, Verdict,
};
pub use rule::{ActionEffects, ActionKind, BlockRiskyOps, Operator, Rule, TuneSystem, WILDCARD};
pub use runtime::RuntimeOps;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for policy evaluation and resolution
    pub use crate::error::{PolicyError, PolicyResult};
    pub use crate::evaluate::{evaluate, Effect, Evaluation};
    pub use crate::policy::Policy;
    pub use crate::resolve::{PolicyResolver, ResolvedPolicy, ScopeRef, Verdict};
    pub use crate::rule::{ActionKind, Operator, Rule};
    pub use crate::runtime::RuntimeOps;
}
