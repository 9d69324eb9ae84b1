//! Vigil Resilience
//!
//! Client-side protection for calls to unreliable dependencies:
//!
//! - **CircuitBreaker**: per-dependency failure isolation (closed, open, half-open)
//! - **BreakerRegistry**: explicit owner of all breakers in a process
//! - **retry**: exponential backoff, optionally gated by a breaker
//! - **FallbackChain**: ordered providers raced against a timeout, with a degraded answer
//! - **TtlCache** and **Throttle**: memoisation and call spacing
//! - **RateLimiter**: sliding-window admission
//!
//! # Architecture
//!
//! ```text
//! call site ─→ TtlCache / RateLimiter ─→ CircuitBreaker ─→ retry ─→ FallbackChain ─→ provider
//! ```
//!
//! All timing uses `tokio::time`, so tests can pause and advance the clock.
//! Nothing here is persisted; state lives for the life of the process.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod breaker;
pub mod cache;
pub mod error;
pub mod fallback;
pub mod limiter;
pub mod registry;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitState, CircuitStatus};
pub use cache::TtlCache;
pub use error::ResilienceError;
pub use fallback::{Answer, AttemptFailure, FallbackChain, FnProvider, Provider, ProviderAttempt};
pub use limiter::{RateLimiter, RateWindow, Throttle};
pub use registry::BreakerRegistry;
pub use retry::{retry, with_breaker, with_breaker_and_retry, RetryPolicy};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wrapping outbound calls
    pub use crate::breaker::{CircuitBreaker, CircuitStatus};
    pub use crate::error::ResilienceError;
    pub use crate::fallback::{Answer, FallbackChain, Provider};
    pub use crate::registry::BreakerRegistry;
    pub use crate::retry::{retry, with_breaker, with_breaker_and_retry, RetryPolicy};
}
