//! Resilience primitives shared across Breakwater crates.
//!
//! Wraps calls to slow, flaky or failing dependencies with a per-attempt
//! timeout, exponential-backoff retries and a circuit breaker.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification, config errors, serde helpers
//! - `observability`: `tracing` support (pulled in by `runtime`)
//! - `runtime`: the async resilience layer (breaker, retrier, resilient call)
//!   and the `testing` helpers
//! - `test-utils`: alias for consumers that only want the `testing` helpers

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{ConfigError, ConfigResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    run_side_effect, with_retry, CallContext, CallOutcome, CancelReason, CircuitBreaker,
    CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics, CircuitState, Clock,
    MockClock, ResilienceError, ResilienceEvent, ResilienceObserver, ResilienceResult,
    ResilientCall, ResilientConfig, ResilientSender, Retrier, RetryError, RetryPolicy, Sender,
    SideEffectPolicy, SystemClock, TokioClock, TracingObserver,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
