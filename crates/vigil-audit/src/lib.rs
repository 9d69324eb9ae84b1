//! Vigil Audit
//!
//! Append-only record of every governance decision:
//!
//! - **Entries**: who did what to which subject, which rules decided it and
//!   the outcome
//! - **Integrity**: each entry carries the SHA-256 of its predecessor, so
//!   edits and deletions break the chain
//! - **Queries**: filtered listing (newest first) and per-entry explanations
//!
//! # Architecture
//!
//! ```text
//! AuditEvent ─→ AuditLog::append ─→ auditLogs/{ulid}  (prev_hash → hash)
//!                                        │
//!               list(filter) ←───────────┤
//!               explain(id)  ←───────────┴─→ modelCards/{version}, policies/{id}
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod entry;
pub mod error;
pub mod explain;
pub mod log;

pub use entry::{
    Actor, AuditEntry, AuditEvent, AuditLinks, ModelRef, Outcome, Subject, GENESIS_HASH,
};
pub use error::{AuditError, AuditResult};
pub use explain::{why_chain, ExplainReport, Explanation, Integrity};
pub use log::{AuditFilter, AuditLog, DEFAULT_LIST_LIMIT};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for writing and reading audit entries
    pub use crate::entry::{Actor, AuditEvent, Outcome, Subject};
    pub use crate::error::{AuditError, AuditResult};
    pub use crate::explain::Explanation;
    pub use crate::log::{AuditFilter, AuditLog};
}
