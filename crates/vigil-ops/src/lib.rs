//! Vigil Ops
//!
//! Runs the governance loop over a document store:
//!
//! - **Jobs**: daily aggregation and policy evaluation, each a thin driver
//!   around a pure function
//! - **Gatekeeper**: pre-flight checks against policy scope, runtime ops and
//!   the org → tenant → team decision
//! - **Queries**: policy, runtime ops, audit listing and explanations
//! - **CLI**: the `vigil` binary over a JSON snapshot of the store
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────── Governance ────────────┐
//! qaResults ─→ │ AggregationJob ─→ governance/{date} │
//!              │ EvaluationJob  ─→ runtimeOps, alerts ├─→ EffectDelivery
//!              │ Gatekeeper     ─→ allow / Blocked    │   limiter → fallback channels
//!              │                                      │   (breaker + retry each)
//!              │ GovernanceQueries                    │
//!              └────────────── AuditLog ──────────────┘
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod delivery;
pub mod error;
pub mod gate;
pub mod governance;
pub mod jobs;
pub mod queries;

pub use delivery::{EffectDelivery, NOTIFIER_DEPENDENCY, SCHEDULER_DEPENDENCY};
pub use error::{OpsError, OpsResult};
pub use gate::{policy_cache_key, Gatekeeper};
pub use governance::{Governance, COMPILE_ACTION, INIT_ACTION};
pub use jobs::{AggregationJob, EvaluationJob, EvaluationReport, EVALUATE_ACTION};
pub use queries::GovernanceQueries;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving governance
    pub use crate::error::{OpsError, OpsResult};
    pub use crate::gate::Gatekeeper;
    pub use crate::governance::Governance;
    pub use crate::queries::GovernanceQueries;
}
