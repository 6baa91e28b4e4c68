//! Mock implementations for resilience tests
//!
//! [`RecordingObserver`] captures every [`ResilienceEvent`] so tests can
//! assert on transitions and retry activity. [`ScriptedOperation`] plays
//! back a fixed sequence of attempt outcomes.

// Allow missing error/panic docs for test mocks - they are designed to be simple
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::resilience::{CallContext, CircuitState, ResilienceEvent, ResilienceObserver};

/// Observer that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ResilienceEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events in emission order
    pub fn events(&self) -> Vec<ResilienceEvent> {
        self.events.lock().clone()
    }

    /// Number of events with the given [`ResilienceEvent::name`]
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|event| event.name() == name).count()
    }

    /// Breaker transitions as `(from, to)` pairs
    pub fn transitions(&self) -> Vec<(CircuitState, CircuitState)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ResilienceEvent::StateTransition { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ResilienceObserver for RecordingObserver {
    fn on_event(&self, event: &ResilienceEvent) {
        self.events.lock().push(event.clone());
    }
}

/// One scripted attempt outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Return `Ok(attempt)` immediately
    Succeed,
    /// Return `Err(ScriptedError)` immediately
    Fail,
    /// Sleep for the duration, then succeed
    Delay(Duration),
    /// Never complete and ignore the attempt context
    Hang,
}

/// Failure produced by a [`Step::Fail`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("scripted failure on attempt {attempt}")]
pub struct ScriptedError {
    pub attempt: u32,
}

/// Fallible operation that replays scripted steps
///
/// Once the script runs out every attempt uses the fallback step. Clones
/// share the script and the invocation counter.
#[derive(Debug, Clone)]
pub struct ScriptedOperation {
    steps: Arc<Mutex<VecDeque<Step>>>,
    fallback: Step,
    invocations: Arc<AtomicU32>,
}

impl ScriptedOperation {
    /// Play `steps` in order, then fail
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            fallback: Step::Fail,
            invocations: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Use `step` for every attempt
    pub fn always(step: Step) -> Self {
        Self::new([]).with_fallback(step)
    }

    #[must_use]
    pub fn with_fallback(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    /// Attempts started so far
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Start one attempt
    ///
    /// The step is chosen when this is called, not when the future is polled.
    pub fn invoke(
        &self,
        _ctx: CallContext,
    ) -> impl Future<Output = Result<u32, ScriptedError>> + Send + 'static {
        let attempt = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.steps.lock().pop_front().unwrap_or(self.fallback);
        async move {
            match step {
                Step::Succeed => Ok(attempt),
                Step::Fail => Err(ScriptedError { attempt }),
                Step::Delay(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(attempt)
                }
                Step::Hang => std::future::pending().await,
            }
        }
    }
}
