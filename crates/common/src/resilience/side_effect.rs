//! Explicit criticality for secondary work
//!
//! After the primary operation succeeds a caller often has follow-up work
//! (publishing an event, warming a cache). Whether a failure there fails the
//! whole request is a decision the caller states per call site with a
//! [`SideEffectPolicy`].

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::resilience::observer::{ResilienceEvent, ResilienceObserver, TracingObserver};

/// How a side-effect failure affects the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectPolicy {
    /// The failure is returned to the caller
    Critical,
    /// The failure is reported and swallowed
    BestEffort,
}

impl fmt::Display for SideEffectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffectPolicy::Critical => write!(f, "critical"),
            SideEffectPolicy::BestEffort => write!(f, "best_effort"),
        }
    }
}

/// Run `effect` under `policy`, reporting swallowed failures through
/// `tracing` at error level
///
/// Returns `Ok(Some(value))` on success, `Ok(None)` for a swallowed
/// best-effort failure and `Err` for a critical failure.
pub async fn run_side_effect<Fut, T, E>(
    name: &str,
    policy: SideEffectPolicy,
    effect: Fut,
) -> Result<Option<T>, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    run_side_effect_observed(name, policy, &TracingObserver, effect).await
}

/// Like [`run_side_effect`] with a caller-chosen observer
pub async fn run_side_effect_observed<Fut, T, E>(
    name: &str,
    policy: SideEffectPolicy,
    observer: &dyn ResilienceObserver,
    effect: Fut,
) -> Result<Option<T>, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    match effect.await {
        Ok(value) => Ok(Some(value)),
        Err(error) => match policy {
            SideEffectPolicy::Critical => Err(error),
            SideEffectPolicy::BestEffort => {
                observer.on_event(&ResilienceEvent::SideEffectFailed {
                    name: name.to_string(),
                    error: error.to_string(),
                });
                Ok(None)
            }
        },
    }
}
