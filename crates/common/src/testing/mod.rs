//! Testing utilities and helpers
//!
//! - **[`assertions`]**: Duration range assertions for timing tests
//! - **[`mocks`]**: A recording observer and a scripted fallible operation
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use breakwater_common::testing::{RecordingObserver, ScriptedOperation, Step};
//!
//! let observer = Arc::new(RecordingObserver::new());
//! let operation = ScriptedOperation::new([Step::Fail, Step::Succeed]);
//! assert_eq!(operation.invocations(), 0);
//! assert!(observer.events().is_empty());
//! ```

pub mod assertions;
pub mod mocks;

pub use assertions::{assert_duration_between, assert_duration_in_range};
pub use mocks::{RecordingObserver, ScriptedError, ScriptedOperation, Step};
