//! Assertion helpers for timing-sensitive tests

use std::time::Duration;

/// Assert that a duration is within `tolerance` of `expected`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use breakwater_common::testing::assertions::assert_duration_in_range;
///
/// assert_duration_in_range(
///     Duration::from_millis(105),
///     Duration::from_millis(100),
///     Duration::from_millis(10),
/// );
/// ```
pub fn assert_duration_in_range(actual: Duration, expected: Duration, tolerance: Duration) {
    let min = expected.saturating_sub(tolerance);
    let max = expected.saturating_add(tolerance);
    assert_duration_between(actual, min, max);
}

/// Assert that `min <= actual <= max`
pub fn assert_duration_between(actual: Duration, min: Duration, max: Duration) {
    assert!(actual >= min && actual <= max, "Duration {actual:?} not in range [{min:?}, {max:?}]");
}
