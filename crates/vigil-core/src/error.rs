//! Error types for Vigil Core
//!
//! Provides error handling for:
//! - Document store operations (read, write, snapshot files)
//! - Configuration loading and validation

use std::path::PathBuf;

/// Boxed error used at collaborator seams (providers, notifiers, schedulers)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a document store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Document could not be converted to or from its typed form
    #[error("serialization failed for {collection}/{key}: {source}")]
    Serde {
        /// Collection name
        collection: String,
        /// Document key
        key: String,
        #[source]
        /// Underlying serde error
        source: serde_json::Error,
    },

    /// Backend refused or failed the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// IO error while reading or writing a snapshot file
    #[error("io error on {path}: {source}")]
    Io {
        /// Snapshot path
        path: PathBuf,
        #[source]
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Snapshot file is not a valid store image
    #[error("invalid snapshot {path}: {message}")]
    InvalidSnapshot {
        /// Snapshot path
        path: PathBuf,
        /// Parser message
        message: String,
    },
}

impl StoreError {
    /// Create serde error for a document
    pub fn serde(
        collection: impl Into<String>,
        key: impl Into<String>,
        source: serde_json::Error,
    ) -> Self {
        Self::Serde {
            collection: collection.into(),
            key: key.into(),
            source,
        }
    }

    /// Check if the failure is transient and the operation may succeed later
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io { .. })
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        #[source]
        /// Underlying IO error
        source: std::io::Error,
    },

    /// TOML syntax or type error
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantically invalid value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::Unavailable("write quota exceeded".to_string());
        assert_eq!(err.to_string(), "store unavailable: write quota exceeded");
        assert!(err.is_transient());
    }

    #[test]
    fn serde_error_is_not_transient() {
        let source = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = StoreError::serde("governance", "2026-01-01", source);
        assert!(err.to_string().contains("governance/2026-01-01"));
        assert!(!err.is_transient());
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::Invalid("breaker.threshold must be >= 1".to_string());
        assert!(err.to_string().contains("invalid configuration"));
    }
}
