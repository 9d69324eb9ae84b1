//! Vigil Telemetry
//!
//! Reduces the most recent raw QA results into one [`DailyMetrics`]
//! document. The reduction is a pure function of its inputs and the current
//! time; loading records and writing the document is the job driver's
//! business.
//!
//! [`DailyMetrics`]: vigil_core::DailyMetrics

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod aggregator;
pub mod stats;

pub use aggregator::Aggregator;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
