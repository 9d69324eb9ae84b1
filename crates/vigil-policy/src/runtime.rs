//! Runtime operational state
//!
//! One document per scope, rewritten whole by every evaluation run.

use crate::rule::WILDCARD;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Currently disabled actions and intents
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOps {
    /// Disabled identifiers; `*` disables everything
    pub disabled: BTreeSet<String>,
    /// Rules responsible, human readable
    pub reason: Option<String>,
    /// When the document was written
    pub updated_at: Option<DateTime<Utc>>,
    /// Policy whose evaluation produced the document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_policy: Option<String>,
    /// Metrics day the evaluation read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_date: Option<NaiveDate>,
}

impl RuntimeOps {
    /// Nothing disabled, stamped at `now`
    #[must_use]
    pub fn cleared(now: DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Check if an action is disabled
    #[must_use]
    pub fn is_disabled(&self, action: &str) -> bool {
        self.disabled.contains(WILDCARD) || self.disabled.contains(action)
    }

    /// Check if everything is disabled
    #[inline]
    #[must_use]
    pub fn blocks_everything(&self) -> bool {
        self.disabled.contains(WILDCARD)
    }
}
