//! Sortable identifiers
//!
//! All ids wrap a ULID so that the lexicographic order of their string form
//! matches creation order. The store's most-recent-N query relies on this.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::SystemTime;
use ulid::Ulid;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate a new id for the current instant
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Generate an id whose timestamp component is `at`
            #[inline]
            #[must_use]
            pub fn at(at: DateTime<Utc>) -> Self {
                Self(Ulid::from_datetime(SystemTime::from(at)))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s).map(Self)
            }
        }
    };
}

ulid_id!(
    /// Raw QA result record id
    RecordId
);

ulid_id!(
    /// Audit log entry id
    AuditId
);

ulid_id!(
    /// Governance alert id
    AlertId
);
