//! Exponential backoff retry with jitter and cancellation
//!
//! The retrier invokes a fallible operation up to `max_attempts` times. After
//! failed attempt `n` (1-based, not the last one) it waits
//! `min(base_delay * 2^(n-1), max_delay)` scaled by a random factor in
//! `[0.75, 1.25]`. Both the wait and each in-flight attempt race the caller's
//! [`CallContext`]; a context that ends always wins over the operation's own
//! error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::instrument;

use crate::error::{ConfigError, ConfigResult};
use crate::resilience::context::{CallContext, CancelReason};
use crate::resilience::observer::{ResilienceEvent, ResilienceObserver, TracingObserver};

/// Largest power of two applied to `base_delay`
const MAX_BACKOFF_EXPONENT: u32 = 31;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Errors returned by the retrier
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Every permitted attempt failed; carries the most recent failure
    #[error("All {attempts} attempts failed: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The caller's context ended before a successful attempt
    #[error("Retry {reason} after {attempts} attempts")]
    Cancelled { reason: CancelReason, attempts: u32 },
}

impl<E> RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Attempts made before the retrier gave up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Take the last operation failure, if the retrier ran out of attempts
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } => Some(source),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including result and summary statistics.
#[derive(Debug)]
pub struct RetryOutcome<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub result: RetryResult<T, E>,
    /// Attempts actually started
    pub attempts: u32,
    /// Sum of completed backoff waits
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }
}

/// Retry budget and backoff bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first try
    pub max_attempts: u32,
    /// Delay before the first retry, before jitter
    pub base_delay: Duration,
    /// Upper bound on the pre-jitter delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a policy builder
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Validate the policy
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be greater than 0"));
        }

        if self.base_delay > self.max_delay {
            return Err(ConfigError::invalid(
                "base_delay",
                format!(
                    "must not exceed max_delay ({:?} > {:?})",
                    self.base_delay, self.max_delay
                ),
            ));
        }

        Ok(())
    }

    /// Pre-jitter delay for 0-based retry index `retry`
    ///
    /// Saturates instead of overflowing for large indices.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Builder for RetryPolicy
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self { policy: RetryPolicy::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    pub fn build(self) -> ConfigResult<RetryPolicy> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

/// Source of uniform samples in `[0, 1)` for jitter
pub trait RandomSource: Send + Sync + fmt::Debug {
    fn next_unit(&self) -> f64;
}

/// Thread-local RNG from `rand`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Always returns the same sample; `FixedRandom(0.5)` disables jitter
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_unit(&self) -> f64 {
        self.0
    }
}

/// Scale `delay` by `0.75 + 0.5 * unit`, with `unit` clamped to `[0, 1]`
///
/// Computed in integer nanoseconds; saturates at `Duration::MAX`.
pub fn apply_jitter(delay: Duration, unit: f64) -> Duration {
    let unit = if unit.is_nan() { 0.5 } else { unit.clamp(0.0, 1.0) };
    let per_million = 750_000 + (unit * 500_000.0).round() as u128;
    let nanos = delay.as_nanos() * per_million / 1_000_000;
    match u64::try_from(nanos / NANOS_PER_SEC) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}

/// Retry executor bound to a policy, a jitter source and an observer
///
/// Holds no per-call state; one retrier can serve any number of concurrent
/// calls.
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    random: Arc<dyn RandomSource>,
    label: String,
    observer: Arc<dyn ResilienceObserver>,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            random: Arc::new(ThreadRandom),
            label: "operation".to_string(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the jitter source
    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Name reported as `dependency` in events
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ResilienceObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Jittered wait after the failure at 0-based retry index `retry`
    pub fn next_delay(&self, retry: u32) -> Duration {
        apply_jitter(self.policy.backoff_delay(retry), self.random.next_unit())
    }

    /// Run `operation` until it succeeds, the budget is spent or `ctx` ends
    pub async fn run<F, Fut, T, E>(&self, ctx: &CallContext, operation: F) -> RetryResult<T, E>
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run_with_outcome(ctx, operation).await.into_result()
    }

    /// Like [`run`](Self::run), also reporting attempts and total delay
    ///
    /// Each attempt gets a child of `ctx`. The child is cancelled once the
    /// attempt settles, so work it spawned does not outlive the attempt.
    #[instrument(skip_all, fields(dependency = %self.label, max_attempts = self.policy.max_attempts))]
    pub async fn run_with_outcome<F, Fut, T, E>(
        &self,
        ctx: &CallContext,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut total_delay = Duration::ZERO;

        loop {
            if let Err(reason) = ctx.check() {
                return self.cancelled(reason, attempts, total_delay);
            }

            attempts += 1;
            let attempt_ctx = ctx.child();
            let guard = attempt_ctx.token().clone().drop_guard();
            let settled = ctx.run(operation(attempt_ctx)).await;
            drop(guard);

            let error = match settled {
                Ok(Ok(value)) => {
                    return RetryOutcome { result: Ok(value), attempts, total_delay };
                }
                Ok(Err(error)) => error,
                Err(reason) => return self.cancelled(reason, attempts, total_delay),
            };

            let cancelled = ctx.check().err();
            let next_delay = (cancelled.is_none() && attempts < max_attempts)
                .then(|| self.next_delay(attempts - 1));

            self.observer.on_event(&ResilienceEvent::AttemptFailed {
                dependency: self.label.clone(),
                attempt: attempts,
                max_attempts,
                next_delay,
                error: error.to_string(),
            });

            if let Some(reason) = cancelled {
                return self.cancelled(reason, attempts, total_delay);
            }

            let Some(delay) = next_delay else {
                self.observer.on_event(&ResilienceEvent::RetriesExhausted {
                    dependency: self.label.clone(),
                    attempts,
                    error: error.to_string(),
                });
                return RetryOutcome {
                    result: Err(RetryError::Exhausted { attempts, source: error }),
                    attempts,
                    total_delay,
                };
            };

            drop(error);
            if let Err(reason) = ctx.sleep(delay).await {
                return self.cancelled(reason, attempts, total_delay);
            }
            total_delay += delay;
        }
    }

    fn cancelled<T, E>(
        &self,
        reason: CancelReason,
        attempts: u32,
        total_delay: Duration,
    ) -> RetryOutcome<T, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.observer.on_event(&ResilienceEvent::RetryCancelled {
            dependency: self.label.clone(),
            attempts,
            reason,
        });
        RetryOutcome { result: Err(RetryError::Cancelled { reason, attempts }), attempts, total_delay }
    }
}

/// Convenience function: retry `operation` under `policy` with default
/// jitter and tracing
pub async fn with_retry<F, Fut, T, E>(
    ctx: &CallContext,
    policy: &RetryPolicy,
    operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(CallContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    Retrier::new(policy.clone()).run(ctx, operation).await
}
