//! Shared error infrastructure for Breakwater crates
//!
//! This module provides the pieces that every error type in the workspace
//! builds on:
//!
//! 1. **`ErrorClassification` trait**: a standard interface for classifying
//!    errors by their characteristics (retryability, severity, criticality)
//!
//! 2. **`ErrorSeverity` enum**: a unified severity level used for logging and
//!    alerting decisions
//!
//! 3. **`ConfigError`**: the error returned when a configuration value fails
//!    validation or cannot be parsed
//!
//! Resilience-specific failures (`CircuitOpen`, `Timeout`, `Cancelled`, ...)
//! live in `crate::resilience::error` and implement `ErrorClassification` so
//! callers can make uniform decisions about them.
//!
//! ## ErrorSeverity Levels
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Informational, expected conditions | Caller cancelled a call |
//! | **Warning** | Degraded but operational | Circuit open, attempt timed out |
//! | **Error** | Failure requiring attention | Dependency failed after retries, bad config |
//! | **Critical** | System integrity at risk | Internal invariant violations |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Trait for classifying errors by their operational characteristics
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are typically transient issues that may succeed if
    /// attempted again, such as:
    /// - Network timeouts
    /// - Circuit breaker open states
    /// - Temporary service unavailability
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when a specific delay is known (for example
    /// the remaining cooldown of an open circuit breaker).
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Configuration errors raised while building or parsing settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed validation
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid { field: &'static str, message: String },

    /// The configuration text could not be parsed
    #[error("Failed to parse {format} configuration: {message}")]
    Parse { format: &'static str, message: String },
}

impl ConfigError {
    /// Create a validation error for a specific field
    pub fn invalid<S: Into<String>>(field: &'static str, message: S) -> Self {
        Self::Invalid { field, message: message.into() }
    }
}

impl ErrorClassification for ConfigError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_display() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
        assert_eq!(ErrorSeverity::Critical.to_string(), "CRITICAL");
    }

    /// Validates `ConfigError::invalid` behavior for the config error display
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the message names the offending field.
    /// - Ensures the error is classified as non-retryable.
    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("max_failures", "must be greater than 0");
        let text = err.to_string();
        assert!(text.contains("max_failures"));
        assert!(text.contains("must be greater than 0"));
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }
}
