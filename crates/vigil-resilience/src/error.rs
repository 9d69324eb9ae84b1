//! Error types for Vigil Resilience

use vigil_core::BoxError;

/// Failure of a call wrapped by a breaker
///
/// `Failed` carries the operation's own error untouched; `CircuitOpen` means
/// the operation was never attempted.
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E = BoxError> {
    /// Breaker refused the call
    #[error("circuit open for {dependency}")]
    CircuitOpen {
        /// Dependency guarded by the breaker
        dependency: String,
    },

    /// The operation ran and failed
    #[error("{0}")]
    Failed(E),
}

impl<E> ResilienceError<E> {
    /// Create circuit-open error
    #[inline]
    pub fn circuit_open(dependency: impl Into<String>) -> Self {
        Self::CircuitOpen {
            dependency: dependency.into(),
        }
    }

    /// Check if the breaker refused the call
    #[inline]
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if error is retryable
    ///
    /// A refused call becomes retryable once the cool-down passes; an
    /// operation failure has already been retried by the wrapper.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_circuit_open()
    }

    /// Operation error, if the operation ran
    #[inline]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::CircuitOpen { .. } => None,
        }
    }
}
