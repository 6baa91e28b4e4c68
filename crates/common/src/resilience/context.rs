//! Call context: cancellation signal plus optional deadline
//!
//! A [`CallContext`] is created by the caller and handed to every attempt of
//! a protected operation. Attempts receive child contexts, so cancelling the
//! caller's context also cancels whatever the current attempt is doing, while
//! an attempt's own (tighter) deadline never leaks back to the caller.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a call context stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The caller cancelled the context explicitly
    Cancelled,
    /// The context's deadline elapsed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "cancelled"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Cancellation and deadline carrier for a single call
///
/// Cloning is cheap and clones observe the same cancellation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_in(timeout)
    }

    /// Wrap an existing cancellation token
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// Tighten the deadline to `deadline`; an earlier existing deadline wins
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Tighten the deadline to `timeout` from now
    #[must_use]
    pub fn deadline_in(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Child context sharing this context's deadline
    ///
    /// Cancelling the parent cancels the child; cancelling the child leaves
    /// the parent untouched.
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline }
    }

    /// The underlying cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline; `None` means unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Non-blocking check: `Err` once the context is cancelled or expired
    ///
    /// Explicit cancellation takes precedence over an elapsed deadline.
    pub fn check(&self) -> Result<(), CancelReason> {
        if self.token.is_cancelled() {
            return Err(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CancelReason::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Whether the context has stopped for any reason
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Resolve once the context is cancelled or its deadline elapses
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => CancelReason::Cancelled,
                () = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }

    /// Drive `future` to completion unless the context stops first
    pub async fn run<F>(&self, future: F) -> Result<F::Output, CancelReason>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = future => Ok(output),
        }
    }

    /// Sleep for `delay` unless the context stops first
    pub async fn sleep(&self, delay: Duration) -> Result<(), CancelReason> {
        self.run(tokio::time::sleep(delay)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_context_is_never_done() {
        let ctx = CallContext::new();
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    /// Validates `CallContext::child` behavior for the parent cancellation
    /// scenario.
    ///
    /// Assertions:
    /// - Cancelling a child leaves the parent running.
    /// - Cancelling the parent cancels every child.
    #[test]
    fn test_child_cancellation_is_one_way() {
        let parent = CallContext::new();
        let first = parent.child();
        let second = parent.child();

        first.cancel();
        assert_eq!(first.check(), Err(CancelReason::Cancelled));
        assert!(parent.check().is_ok());
        assert!(second.check().is_ok());

        parent.cancel();
        assert_eq!(second.check(), Err(CancelReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50))
            .deadline_in(Duration::from_secs(10));
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(50)));

        let tighter = ctx.child().deadline_in(Duration::from_millis(20));
        assert_eq!(tighter.remaining(), Some(Duration::from_millis(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_is_reported() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        let reason = ctx.done().await;
        assert_eq!(reason, CancelReason::DeadlineExceeded);
        assert_eq!(ctx.check(), Err(CancelReason::DeadlineExceeded));
    }

    /// Validates `CallContext::run` behavior for the slow future scenario.
    ///
    /// Assertions:
    /// - A future slower than the deadline is abandoned at the deadline.
    #[tokio::test(start_paused = true)]
    async fn test_run_abandons_slow_future() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        let start = Instant::now();

        let result = ctx.run(tokio::time::sleep(Duration::from_millis(500))).await;

        assert_eq!(result, Err(CancelReason::DeadlineExceeded));
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_cancel() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = ctx.sleep(Duration::from_secs(60)).await;
        assert_eq!(result, Err(CancelReason::Cancelled));
    }

    #[tokio::test]
    async fn test_run_refuses_to_start_when_cancelled() {
        let ctx = CallContext::new();
        ctx.cancel();
        let result = ctx.run(async { 42 }).await;
        assert_eq!(result, Err(CancelReason::Cancelled));
    }
}
