//! Resilience patterns for calls to unreliable dependencies
//!
//! - **Circuit Breaker**: stops calling a dependency once it is observed to
//!   be unhealthy and probes it again after a cooldown
//! - **Retrier**: exponential backoff with jitter, bounded by an attempt
//!   budget and the caller's [`CallContext`]
//! - **Resilient Call**: breaker gate, then retries, then a per-attempt
//!   timeout, recorded in the breaker as one outcome
//!
//! Around those sit a [`Sender`] decorator for outbound channels, an explicit
//! [`SideEffectPolicy`] for secondary work, and [`ResilienceEvent`]s reported
//! to a pluggable [`ResilienceObserver`].
//!
//! ```rust
//! use std::time::Duration;
//!
//! use breakwater_common::resilience::{CallContext, ResilientCall, ResilientConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let email = ResilientCall::new("email", &ResilientConfig::default())?;
//! let ctx = CallContext::with_timeout(Duration::from_secs(2));
//!
//! let id = email
//!     .call(&ctx, |_attempt| async { Ok::<_, std::io::Error>("msg-1") })
//!     .await?;
//! assert_eq!(id, "msg-1");
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod circuit_breaker;
pub mod clock;
pub mod context;
pub mod error;
pub mod observer;
pub mod retry;
pub mod sender;
pub mod side_effect;

pub use call::{ResilientCall, ResilientConfig};
pub use circuit_breaker::{
    CallOutcome, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerMetrics, CircuitState, Rejected,
};
pub use clock::{Clock, MockClock, SystemClock, TokioClock};
pub use context::{CallContext, CancelReason};
pub use error::{ResilienceError, ResilienceResult};
pub use observer::{NoopObserver, ResilienceEvent, ResilienceObserver, TracingObserver};
pub use retry::{
    apply_jitter, with_retry, FixedRandom, RandomSource, Retrier, RetryError, RetryOutcome,
    RetryPolicy, RetryPolicyBuilder, RetryResult, ThreadRandom,
};
pub use sender::{ResilientSender, Sender};
pub use side_effect::{run_side_effect, run_side_effect_observed, SideEffectPolicy};
