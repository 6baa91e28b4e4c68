//! Structured observations emitted by the resilience layer
//!
//! The core decides *what* to report; where it goes is up to the host. The
//! default [`TracingObserver`] turns every event into a `tracing` event with
//! structured fields, so a service that already installs a subscriber gets
//! breaker transitions and retry activity in its logs for free.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::context::CancelReason;

/// Something the resilience layer observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResilienceEvent {
    /// The breaker moved between states
    StateTransition { dependency: String, from: CircuitState, to: CircuitState },
    /// The breaker rejected a call without invoking the operation
    CallRejected { dependency: String, retry_after: Duration },
    /// An attempt failed; `next_delay` is `None` when no retry follows
    AttemptFailed {
        dependency: String,
        attempt: u32,
        max_attempts: u32,
        next_delay: Option<Duration>,
        error: String,
    },
    /// Retrying stopped because the caller's context ended
    RetryCancelled { dependency: String, attempts: u32, reason: CancelReason },
    /// Every permitted attempt failed
    RetriesExhausted { dependency: String, attempts: u32, error: String },
    /// A resilient call finished; `outcome` is `"success"` or an error kind
    CallCompleted { dependency: String, outcome: &'static str, attempts: u32, elapsed: Duration },
    /// A best-effort side effect failed and was not propagated
    SideEffectFailed { name: String, error: String },
}

impl ResilienceEvent {
    /// Stable event name for log pipelines and metrics keys
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateTransition { .. } => "breaker.state_transition",
            Self::CallRejected { .. } => "breaker.call_rejected",
            Self::AttemptFailed { .. } => "retry.attempt_failed",
            Self::RetryCancelled { .. } => "retry.cancelled",
            Self::RetriesExhausted { .. } => "retry.exhausted",
            Self::CallCompleted { .. } => "call.completed",
            Self::SideEffectFailed { .. } => "side_effect.failed",
        }
    }
}

/// Receiver for [`ResilienceEvent`]s
///
/// Called synchronously on the caller's task, never while the breaker's lock
/// is held. Implementations should be cheap and must not block.
pub trait ResilienceObserver: Send + Sync + fmt::Debug {
    /// Handle one event
    fn on_event(&self, event: &ResilienceEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ResilienceObserver for TracingObserver {
    fn on_event(&self, event: &ResilienceEvent) {
        let name = event.name();
        match event {
            ResilienceEvent::StateTransition { dependency, from, to } => {
                if *to == CircuitState::Open {
                    warn!(event = name, dependency = %dependency, from = %from, to = %to, "Circuit breaker opened");
                } else {
                    info!(event = name, dependency = %dependency, from = %from, to = %to, "Circuit breaker state changed");
                }
            }
            ResilienceEvent::CallRejected { dependency, retry_after } => {
                debug!(
                    event = name,
                    dependency = %dependency,
                    retry_after_ms = retry_after.as_millis(),
                    "Circuit breaker rejecting call"
                );
            }
            ResilienceEvent::AttemptFailed { dependency, attempt, max_attempts, next_delay, error } => {
                match next_delay {
                    Some(delay) => warn!(
                        event = name,
                        dependency = %dependency,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "Attempt failed, retrying after backoff"
                    ),
                    None => debug!(
                        event = name,
                        dependency = %dependency,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %error,
                        "Attempt failed"
                    ),
                }
            }
            ResilienceEvent::RetryCancelled { dependency, attempts, reason } => {
                info!(
                    event = name,
                    dependency = %dependency,
                    attempts = attempts,
                    reason = %reason,
                    "Retry stopped by caller context"
                );
            }
            ResilienceEvent::RetriesExhausted { dependency, attempts, error } => {
                warn!(
                    event = name,
                    dependency = %dependency,
                    attempts = attempts,
                    error = %error,
                    "All retry attempts exhausted"
                );
            }
            ResilienceEvent::CallCompleted { dependency, outcome, attempts, elapsed } => {
                debug!(
                    event = name,
                    dependency = %dependency,
                    outcome = outcome,
                    attempts = attempts,
                    elapsed_ms = elapsed.as_millis(),
                    "Resilient call completed"
                );
            }
            ResilienceEvent::SideEffectFailed { name: side_effect, error } => {
                error!(
                    event = name,
                    side_effect = %side_effect,
                    error = %error,
                    "Best-effort side effect failed"
                );
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ResilienceObserver for NoopObserver {
    fn on_event(&self, _event: &ResilienceEvent) {}
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        let event = ResilienceEvent::StateTransition {
            dependency: "email".to_string(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
        };
        assert_eq!(event.name(), "breaker.state_transition");

        let event = ResilienceEvent::SideEffectFailed {
            name: "publish".to_string(),
            error: "broker down".to_string(),
        };
        assert_eq!(event.name(), "side_effect.failed");
    }

    /// Collects formatted log lines for inspection
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn every_event() -> Vec<ResilienceEvent> {
        vec![
            ResilienceEvent::StateTransition {
                dependency: "push".to_string(),
                from: CircuitState::Closed,
                to: CircuitState::Open,
            },
            ResilienceEvent::CallRejected {
                dependency: "push".to_string(),
                retry_after: Duration::from_secs(1),
            },
            ResilienceEvent::AttemptFailed {
                dependency: "push".to_string(),
                attempt: 1,
                max_attempts: 3,
                next_delay: Some(Duration::from_millis(100)),
                error: "503".to_string(),
            },
            ResilienceEvent::RetryCancelled {
                dependency: "push".to_string(),
                attempts: 1,
                reason: CancelReason::Cancelled,
            },
            ResilienceEvent::RetriesExhausted {
                dependency: "push".to_string(),
                attempts: 3,
                error: "503".to_string(),
            },
            ResilienceEvent::CallCompleted {
                dependency: "push".to_string(),
                outcome: "success",
                attempts: 2,
                elapsed: Duration::from_millis(120),
            },
            ResilienceEvent::SideEffectFailed {
                name: "publish".to_string(),
                error: "broker down".to_string(),
            },
        ]
    }

    /// Validates `TracingObserver` output for every event variant.
    ///
    /// Assertions:
    /// - Each event produces one log line carrying its stable name.
    /// - Breaker trips log at WARN, failed side effects at ERROR.
    #[test]
    fn test_tracing_observer_logs_every_event() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let events = every_event();
        tracing::subscriber::with_default(subscriber, || {
            for event in &events {
                TracingObserver.on_event(event);
            }
        });

        let output = logs.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), events.len(), "unexpected output: {output}");
        for (line, event) in lines.iter().zip(&events) {
            assert!(line.contains(event.name()), "{line} should name {}", event.name());
            assert!(line.contains("push") || line.contains("publish"));
        }
        assert!(lines[0].contains("WARN") && lines[0].contains("Circuit breaker opened"));
        assert!(lines[6].contains("ERROR"));
    }
}
