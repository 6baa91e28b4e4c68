//! Failure taxonomy for resilient calls

use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};
use crate::resilience::context::CancelReason;

/// Errors returned by the circuit breaker and the resilient call wrapper
///
/// Generic over the protected operation's error type `E`, which is carried
/// unchanged in [`ResilienceError::Operation`].
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker rejected the call without invoking the operation
    #[error("Circuit breaker for '{dependency}' is open (retry in {retry_after:?})")]
    CircuitOpen { dependency: String, retry_after: Duration },

    /// The operation failed on its final attempt
    #[error("Operation failed: {source}")]
    Operation {
        #[source]
        source: E,
    },

    /// A single attempt exceeded its time slice
    #[error("Attempt timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The caller's context was cancelled or its deadline elapsed
    #[error("Call {reason}")]
    Cancelled { reason: CancelReason },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether the breaker rejected the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Whether the caller gave up (cancellation or caller deadline)
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether the last attempt timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Borrow the operation's own error, if that is what ended the call
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation { source } => Some(source),
            _ => None,
        }
    }

    /// Take the operation's own error, if that is what ended the call
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation { source } => Some(source),
            _ => None,
        }
    }

    /// Short label used in logs and observer events
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Operation { .. } => "operation_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

impl<E> ErrorClassification for ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } | Self::Timeout { .. } => true,
            Self::Operation { .. } => true,
            Self::Cancelled { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitOpen { .. } | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Operation { .. } => ErrorSeverity::Error,
            Self::Cancelled { .. } => ErrorSeverity::Info,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;
