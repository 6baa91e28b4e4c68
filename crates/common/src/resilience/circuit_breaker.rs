//! Circuit breaker state machine
//!
//! A breaker tracks the health of one downstream dependency across every call
//! made to it and decides whether a new call may proceed at all:
//!
//! ```text
//! Closed  --(max_failures consecutive failures)----------------> Open
//! Open    --(reset_timeout elapsed since last failure, on call)-> HalfOpen
//! HalfOpen --(any failure)-------------------------------------> Open
//! HalfOpen --(half_open_success_threshold successes)-----------> Closed
//! ```
//!
//! All state and counters live in one struct behind a single
//! `parking_lot::Mutex`. The lock is held only for a gate check or an outcome
//! update, never while the protected operation runs, so unrelated calls are
//! not serialized behind each other's I/O. Observer events are emitted after
//! the lock is released.
//!
//! HalfOpen does not limit how many trial calls are in flight: every caller
//! arriving while HalfOpen is admitted and reports its own outcome.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::instrument;

use crate::error::{ConfigError, ConfigResult};
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::error::{ResilienceError, ResilienceResult};
use crate::resilience::observer::{ResilienceEvent, ResilienceObserver, TracingObserver};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, admitting trial requests to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// How a finished call should be booked against the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The dependency answered successfully
    Success,
    /// The dependency failed (any kind of failure)
    Failure,
    /// The call says nothing about the dependency's health
    Ignored,
}

/// A call refused by an open breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    /// Remaining cooldown before a trial call will be admitted
    pub retry_after: Duration,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip Closed -> Open
    pub max_failures: u32,
    /// Cooldown after the last failure before Open admits a trial call
    pub reset_timeout: Duration,
    /// Consecutive HalfOpen successes that close the circuit
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_failures == 0 {
            return Err(ConfigError::invalid("max_failures", "must be greater than 0"));
        }

        if self.half_open_success_threshold == 0 {
            return Err(ConfigError::invalid(
                "half_open_success_threshold",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.config.max_failures = max_failures;
        self
    }

    pub fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.config.reset_timeout = reset_timeout;
        self
    }

    pub fn half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.config.half_open_success_threshold = threshold;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time snapshot of a breaker, for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Calls admitted through the gate
    pub total_calls: u64,
    /// Calls refused while open
    pub rejected_calls: u64,
    pub last_failure_time: Option<Instant>,
    pub state_change_time: Instant,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    state_changed_at: Instant,
    total_calls: u64,
    rejected_calls: u64,
}

type Transition = (CircuitState, CircuitState);

impl BreakerState {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            state_changed_at: now,
            total_calls: 0,
            rejected_calls: 0,
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        self.state_changed_at = now;
        match to {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.success_count = 0;
            }
            CircuitState::HalfOpen => self.success_count = 0,
            CircuitState::Open => {}
        }
        Some((from, to))
    }
}

struct Shared<C> {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    clock: C,
    observer: Arc<dyn ResilienceObserver>,
}

/// Concurrency-safe circuit breaker for one dependency
///
/// Cloning is cheap; clones share the same state.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    inner: Arc<Shared<C>>,
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("state", &state.state)
            .field("failure_count", &state.failure_count)
            .field("success_count", &state.success_count)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker on the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        Self::with_observer(name, config, clock, Arc::new(TracingObserver))
    }

    /// Create a breaker that reports to `observer`
    pub fn with_observer(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
        observer: Arc<dyn ResilienceObserver>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let state = Mutex::new(BreakerState::new(clock.now()));
        Ok(Self { inner: Arc::new(Shared { name: name.into(), config, state, clock, observer }) })
    }

    /// Name of the protected dependency
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.inner.config
    }

    /// Ask whether a call may proceed
    ///
    /// While Open, the first caller to arrive after the cooldown moves the
    /// breaker to HalfOpen and is admitted as a trial. Every admitted call
    /// must later be booked with [`record`](Self::record).
    pub fn try_acquire(&self) -> Result<(), Rejected> {
        let reset_timeout = self.inner.config.reset_timeout;
        let (decision, transition) = {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();
            match state.state {
                CircuitState::Closed | CircuitState::HalfOpen => {
                    state.total_calls += 1;
                    (Ok(()), None)
                }
                CircuitState::Open => {
                    let elapsed = state
                        .last_failure_at
                        .map_or(reset_timeout, |at| now.saturating_duration_since(at));
                    if elapsed >= reset_timeout {
                        let transition = state.transition(CircuitState::HalfOpen, now);
                        state.total_calls += 1;
                        (Ok(()), transition)
                    } else {
                        state.rejected_calls += 1;
                        (Err(Rejected { retry_after: reset_timeout - elapsed }), None)
                    }
                }
            }
        };

        self.emit_transition(transition);
        if let Err(rejected) = decision {
            self.inner.observer.on_event(&ResilienceEvent::CallRejected {
                dependency: self.inner.name.clone(),
                retry_after: rejected.retry_after,
            });
        }
        decision
    }

    /// Book the outcome of an admitted call
    ///
    /// A late outcome that arrives after another caller already tripped the
    /// breaker does not reopen or close it: a success while Open is dropped,
    /// a failure while Open only refreshes the cooldown start.
    pub fn record(&self, outcome: CallOutcome) {
        if outcome == CallOutcome::Ignored {
            return;
        }

        let max_failures = self.inner.config.max_failures;
        let success_threshold = self.inner.config.half_open_success_threshold;
        let transition = {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();
            match (outcome, state.state) {
                (CallOutcome::Success, CircuitState::Closed) => {
                    state.failure_count = 0;
                    None
                }
                (CallOutcome::Success, CircuitState::HalfOpen) => {
                    state.success_count += 1;
                    if state.success_count >= success_threshold {
                        state.transition(CircuitState::Closed, now)
                    } else {
                        None
                    }
                }
                (CallOutcome::Failure, CircuitState::Closed) => {
                    state.failure_count = state.failure_count.saturating_add(1);
                    state.last_failure_at = Some(now);
                    if state.failure_count >= max_failures {
                        state.transition(CircuitState::Open, now)
                    } else {
                        None
                    }
                }
                (CallOutcome::Failure, CircuitState::HalfOpen) => {
                    state.failure_count = state.failure_count.saturating_add(1);
                    state.last_failure_at = Some(now);
                    state.transition(CircuitState::Open, now)
                }
                (CallOutcome::Failure, CircuitState::Open) => {
                    state.failure_count = state.failure_count.saturating_add(1);
                    state.last_failure_at = Some(now);
                    None
                }
                (CallOutcome::Success, CircuitState::Open) | (CallOutcome::Ignored, _) => None,
            }
        };

        self.emit_transition(transition);
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        self.record(CallOutcome::Success);
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        self.record(CallOutcome::Failure);
    }

    /// Execute an async operation with circuit breaker protection
    ///
    /// The operation is never invoked when the breaker rejects the call. Any
    /// `Err` counts as a failure.
    #[instrument(skip(self, operation), fields(dependency = %self.inner.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.try_acquire().map_err(|rejected| self.rejection_error(rejected))?;

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(source) => {
                self.record_failure();
                Err(ResilienceError::Operation { source })
            }
        }
    }

    /// Execute an async operation and let `classify` decide how to book it
    ///
    /// Returns `Err(Rejected)` without invoking the operation when the
    /// breaker is open. If the returned future is dropped mid-operation no
    /// outcome is recorded, which has the same effect as
    /// [`CallOutcome::Ignored`].
    pub async fn execute_classified<F, Fut, T, X, K>(
        &self,
        operation: F,
        classify: K,
    ) -> Result<Result<T, X>, Rejected>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, X>>,
        K: FnOnce(&Result<T, X>) -> CallOutcome,
    {
        self.try_acquire()?;
        let result = operation().await;
        self.record(classify(&result));
        Ok(result)
    }

    /// Execute a synchronous operation with circuit breaker protection
    #[instrument(skip(self, operation), fields(dependency = %self.inner.name))]
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.try_acquire().map_err(|rejected| self.rejection_error(rejected))?;

        match operation() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(source) => {
                self.record_failure();
                Err(ResilienceError::Operation { source })
            }
        }
    }

    /// Build the `CircuitOpen` error for a rejection
    pub fn rejection_error<E>(&self, rejected: Rejected) -> ResilienceError<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ResilienceError::CircuitOpen {
            dependency: self.inner.name.clone(),
            retry_after: rejected.retry_after,
        }
    }

    /// Current state snapshot; may be stale as soon as it returns
    pub fn state(&self) -> CircuitState {
        self.inner.state.lock().state
    }

    /// Fast check that the breaker is not Open
    ///
    /// Does not perform the Open -> HalfOpen transition; use
    /// [`try_acquire`](Self::try_acquire) for gating.
    pub fn is_available(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Get circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.inner.state.lock();
        CircuitBreakerMetrics {
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            total_calls: state.total_calls,
            rejected_calls: state.rejected_calls,
            last_failure_time: state.last_failure_at,
            state_change_time: state.state_changed_at,
        }
    }

    /// Force the breaker back to Closed with cleared counters
    pub fn reset(&self) {
        let transition = {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();
            let transition = state.transition(CircuitState::Closed, now);
            state.failure_count = 0;
            state.success_count = 0;
            state.last_failure_at = None;
            transition
        };
        self.emit_transition(transition);
    }

    fn emit_transition(&self, transition: Option<Transition>) {
        if let Some((from, to)) = transition {
            self.inner.observer.on_event(&ResilienceEvent::StateTransition {
                dependency: self.inner.name.clone(),
                from,
                to,
            });
        }
    }
}
