//! Small helpers shared by the configuration types
//!
//! - **[`serde`]**: serialization helpers for `Duration` fields

pub mod serde;

pub use self::serde::duration_millis;
