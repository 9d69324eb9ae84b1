//! Vigil Core
//!
//! Shared vocabulary for the resilience and governance crates:
//!
//! - **Documents**: raw QA results and the daily metrics derived from them
//! - **Identifiers**: sortable ULID-based ids for records, audit entries and alerts
//! - **Configuration**: `VigilConfig`, loadable from TOML
//! - **Persistence seam**: the `DocumentStore` trait plus an in-memory store
//! - **Collaborators**: notification and follow-up job seams
//!
//! # Architecture
//!
//! ```text
//! qaResults ─→ Aggregator ─→ governance/{date} ─→ Evaluator ─→ runtimeOps/{scope}
//!                                                     │
//!                                                     └─→ auditLogs, alerts, Notifier
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod collab;
pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod store;

pub use collab::{
    AlertChannels, FollowUpScheduler, LogNotifier, LogScheduler, Notification, Notifier, Severity,
};
pub use config::{
    BreakerConfig, CacheConfig, DefaultDecision, FallbackConfig, GovernanceConfig, LimiterConfig,
    RetryConfig, TelemetryConfig, VigilConfig,
};
pub use error::{BoxError, ConfigError, StoreError, StoreResult};
pub use ids::{AlertId, AuditId, RecordId};
pub use metrics::{DailyMetrics, Metric, RawResult};
pub use store::{collections, DocumentStore, MemoryStore, StoreExt};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Vigil documents
    pub use crate::config::VigilConfig;
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::metrics::{DailyMetrics, Metric, RawResult};
    pub use crate::store::{collections, DocumentStore, MemoryStore, StoreExt};
}
