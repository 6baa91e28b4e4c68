//! Resilient call wrapper: breaker, retrier and per-attempt timeout
//!
//! Composition order is fixed:
//!
//! ```text
//! breaker gate -> retrier -> attempt bounded by min(now + timeout, caller deadline)
//! ```
//!
//! The breaker sees one aggregate outcome per call, so a call that fails
//! twice and then succeeds books a single success. A call rejected by the
//! breaker never arms a timeout and never reaches the retrier.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{ConfigError, ConfigResult};
use crate::resilience::circuit_breaker::{
    CallOutcome, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::context::CallContext;
use crate::resilience::error::{ResilienceError, ResilienceResult};
use crate::resilience::observer::{ResilienceEvent, ResilienceObserver, TracingObserver};
use crate::resilience::retry::{RandomSource, Retrier, RetryError, RetryPolicy};
use crate::utils::duration_millis;

/// Configuration surface for a [`ResilientCall`]
///
/// Durations are whole milliseconds on the wire (`timeout_ms`, ...). Missing
/// fields take their defaults; unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilientConfig {
    /// Upper bound for a single attempt
    #[serde(rename = "timeout_ms", with = "duration_millis")]
    pub timeout: Duration,
    pub max_failures: u32,
    #[serde(rename = "reset_timeout_ms", with = "duration_millis")]
    pub reset_timeout: Duration,
    pub half_open_success_threshold: u32,
    pub retry_max_attempts: u32,
    #[serde(rename = "retry_base_delay_ms", with = "duration_millis")]
    pub retry_base_delay: Duration,
    #[serde(rename = "retry_max_delay_ms", with = "duration_millis")]
    pub retry_max_delay: Duration,
}

impl Default for ResilientConfig {
    fn default() -> Self {
        let breaker = CircuitBreakerConfig::default();
        let retry = RetryPolicy::default();
        Self {
            timeout: Duration::from_secs(5),
            max_failures: breaker.max_failures,
            reset_timeout: breaker.reset_timeout,
            half_open_success_threshold: breaker.half_open_success_threshold,
            retry_max_attempts: retry.max_attempts,
            retry_base_delay: retry.base_delay,
            retry_max_delay: retry.max_delay,
        }
    }
}

impl ResilientConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(input: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|err| ConfigError::Parse { format: "toml", message: err.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: self.max_failures,
            reset_timeout: self.reset_timeout,
            half_open_success_threshold: self.half_open_success_threshold,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("timeout", "must be greater than 0"));
        }
        self.breaker_config().validate()?;
        self.retry_policy().validate()
    }
}

/// A dependency protected by a breaker, a retrier and a per-attempt timeout
///
/// Clones share the breaker, so every clone sees the same dependency health.
pub struct ResilientCall<C: Clock = SystemClock> {
    name: Arc<str>,
    timeout: Duration,
    breaker: CircuitBreaker<C>,
    retrier: Retrier,
    observer: Arc<dyn ResilienceObserver>,
}

impl<C: Clock> Clone for ResilientCall<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            timeout: self.timeout,
            breaker: self.breaker.clone(),
            retrier: self.retrier.clone(),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<C: Clock> fmt::Debug for ResilientCall<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientCall")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("breaker", &self.breaker)
            .field("retry_policy", self.retrier.policy())
            .finish()
    }
}

impl ResilientCall<SystemClock> {
    /// Protect the dependency `name` using the system clock and tracing
    pub fn new(name: impl Into<String>, config: &ResilientConfig) -> ConfigResult<Self> {
        Self::with_parts(name, config, SystemClock, Arc::new(TracingObserver))
    }
}

impl<C: Clock> ResilientCall<C> {
    /// Build with an explicit clock and observer
    pub fn with_parts(
        name: impl Into<String>,
        config: &ResilientConfig,
        clock: C,
        observer: Arc<dyn ResilienceObserver>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let name: String = name.into();
        let breaker = CircuitBreaker::with_observer(
            name.clone(),
            config.breaker_config(),
            clock,
            Arc::clone(&observer),
        )?;
        let retrier = Retrier::new(config.retry_policy())
            .with_label(name.clone())
            .with_observer(Arc::clone(&observer));
        Ok(Self { name: name.into(), timeout: config.timeout, breaker, retrier, observer })
    }

    /// Replace the retrier's jitter source
    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.retrier = self.retrier.with_random(random);
        self
    }

    /// Name of the protected dependency
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `operation` under the breaker, the retry policy and the timeout
    ///
    /// Each attempt receives a child of `ctx` whose deadline is the earlier
    /// of the caller's deadline and `now + timeout`. A call that ends because
    /// `ctx` was cancelled or expired returns `Cancelled` and is not booked
    /// against the breaker; neither is a call whose future is dropped.
    #[instrument(skip_all, fields(dependency = %self.name))]
    pub async fn call<F, Fut, T, E>(
        &self,
        ctx: &CallContext,
        mut operation: F,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let started = tokio::time::Instant::now();

        if let Err(rejected) = self.breaker.try_acquire() {
            let error = self.breaker.rejection_error(rejected);
            self.completed(error.kind(), 0, started);
            return Err(error);
        }

        let timeout = self.timeout;
        let outcome = self
            .retrier
            .run_with_outcome(ctx, |attempt_ctx: CallContext| {
                let attempt_ctx = attempt_ctx.deadline_in(timeout);
                let attempt = operation(attempt_ctx.clone());
                async move {
                    match attempt_ctx.run(attempt).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(source)) => Err(ResilienceError::Operation { source }),
                        Err(_) => Err(ResilienceError::Timeout { timeout }),
                    }
                }
            })
            .await;

        let attempts = outcome.attempts;
        let result = match outcome.result {
            Ok(value) => Ok(value),
            Err(RetryError::Exhausted { source, .. }) => Err(source),
            Err(RetryError::Cancelled { reason, .. }) => Err(ResilienceError::Cancelled { reason }),
        };

        let (booked, kind) = match &result {
            Ok(_) => (CallOutcome::Success, "success"),
            Err(error) if error.is_cancelled() => (CallOutcome::Ignored, error.kind()),
            Err(error) => (CallOutcome::Failure, error.kind()),
        };
        self.breaker.record(booked);
        self.completed(kind, attempts, started);
        result
    }

    fn completed(&self, outcome: &'static str, attempts: u32, started: tokio::time::Instant) {
        self.observer.on_event(&ResilienceEvent::CallCompleted {
            dependency: self.name.to_string(),
            outcome,
            attempts,
            elapsed: started.elapsed(),
        });
    }
}
