//! Outbound sender port and its resilient decorator
//!
//! A [`Sender`] delivers a message over one named channel (a push provider,
//! an email gateway). [`ResilientSender`] wraps any sender in a
//! [`ResilientCall`] labelled with the channel and is itself a `Sender`, so
//! the composition root can swap one for the other.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ConfigResult;
use crate::resilience::call::{ResilientCall, ResilientConfig};
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::context::CallContext;
use crate::resilience::error::ResilienceError;
use crate::resilience::observer::ResilienceObserver;

/// A channel-labelled outbound dependency
#[async_trait]
pub trait Sender: Send + Sync {
    /// Payload accepted by this sender
    type Message: Send + Sync;
    /// Failure returned by a delivery attempt
    type Error: std::error::Error + Send + Sync + 'static;

    /// Channel label, used as the dependency name
    fn channel(&self) -> &str;

    /// Deliver one message, honouring `ctx`'s cancellation and deadline
    async fn send(&self, ctx: &CallContext, message: &Self::Message) -> Result<(), Self::Error>;
}

/// A [`Sender`] protected by a breaker, retries and a per-attempt timeout
pub struct ResilientSender<S, C: Clock = SystemClock> {
    inner: S,
    call: ResilientCall<C>,
}

impl<S: Sender> ResilientSender<S, SystemClock> {
    /// Wrap `inner`, naming the breaker after its channel
    pub fn new(inner: S, config: &ResilientConfig) -> ConfigResult<Self> {
        let call = ResilientCall::new(inner.channel(), config)?;
        Ok(Self { inner, call })
    }
}

impl<S: Sender, C: Clock> ResilientSender<S, C> {
    /// Wrap `inner` with an explicit clock and observer
    pub fn with_parts(
        inner: S,
        config: &ResilientConfig,
        clock: C,
        observer: Arc<dyn ResilienceObserver>,
    ) -> ConfigResult<Self> {
        let call = ResilientCall::with_parts(inner.channel(), config, clock, observer)?;
        Ok(Self { inner, call })
    }

    /// Wrap `inner` with a prepared call, e.g. to share a breaker
    pub fn from_call(inner: S, call: ResilientCall<C>) -> Self {
        Self { inner, call }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn resilient_call(&self) -> &ResilientCall<C> {
        &self.call
    }
}

impl<S: Sender + fmt::Debug, C: Clock> fmt::Debug for ResilientSender<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientSender")
            .field("inner", &self.inner)
            .field("call", &self.call)
            .finish()
    }
}

#[async_trait]
impl<S: Sender, C: Clock> Sender for ResilientSender<S, C> {
    type Message = S::Message;
    type Error = ResilienceError<S::Error>;

    fn channel(&self) -> &str {
        self.inner.channel()
    }

    async fn send(&self, ctx: &CallContext, message: &Self::Message) -> Result<(), Self::Error> {
        let inner = &self.inner;
        self.call
            .call(ctx, |attempt_ctx| async move { inner.send(&attempt_ctx, message).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use thiserror::Error;

    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::resilience::clock::TokioClock;
    use crate::testing::RecordingObserver;

    #[derive(Debug, Error)]
    #[error("gateway returned 503")]
    struct GatewayError;

    #[derive(Debug, Default)]
    struct FakeSms {
        failures_left: AtomicU32,
        attempts: AtomicU32,
        delivered: Mutex<Vec<String>>,
    }

    impl FakeSms {
        fn failing(times: u32) -> Self {
            Self { failures_left: AtomicU32::new(times), ..Self::default() }
        }
    }

    #[async_trait]
    impl Sender for FakeSms {
        type Message = String;
        type Error = GatewayError;

        fn channel(&self) -> &str {
            "sms"
        }

        async fn send(&self, _ctx: &CallContext, message: &String) -> Result<(), GatewayError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(GatewayError);
            }
            self.delivered.lock().push(message.clone());
            Ok(())
        }
    }

    fn config(max_attempts: u32, max_failures: u32) -> ResilientConfig {
        ResilientConfig {
            retry_max_attempts: max_attempts,
            max_failures,
            retry_base_delay: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(50),
            ..ResilientConfig::default()
        }
    }

    fn wrap(inner: FakeSms, config: &ResilientConfig) -> ResilientSender<FakeSms, TokioClock> {
        ResilientSender::with_parts(inner, config, TokioClock, Arc::new(RecordingObserver::new()))
            .expect("valid config")
    }

    #[tokio::test(start_paused = true)]
    async fn test_resilient_sender_retries_transient_failures() {
        let sender = wrap(FakeSms::failing(2), &config(3, 5));

        sender.send(&CallContext::new(), &"code 4242".to_string()).await.expect("delivered");

        assert_eq!(sender.channel(), "sms");
        assert_eq!(sender.inner().attempts.load(Ordering::SeqCst), 3);
        assert_eq!(*sender.inner().delivered.lock(), vec!["code 4242".to_string()]);
        assert_eq!(sender.resilient_call().name(), "sms");
    }

    /// Validates the decorator as a drop-in `Sender`.
    ///
    /// Assertions:
    /// - Confirms the exhausted call surfaces the gateway error.
    /// - Confirms the next send is rejected by the open breaker.
    #[tokio::test(start_paused = true)]
    async fn test_resilient_sender_opens_breaker() {
        async fn deliver<S: Sender<Message = String>>(sender: &S) -> Result<(), S::Error> {
            sender.send(&CallContext::new(), &"hello".to_string()).await
        }

        let sender = wrap(FakeSms::failing(u32::MAX), &config(2, 1));

        let first = deliver(&sender).await;
        assert!(matches!(first, Err(ResilienceError::Operation { .. })));
        assert_eq!(sender.resilient_call().state(), CircuitState::Open);

        let second = deliver(&sender).await;
        assert!(matches!(second, Err(ResilienceError::CircuitOpen { ref dependency, .. }) if dependency == "sms"));
        assert_eq!(sender.inner().attempts.load(Ordering::SeqCst), 2);
    }
}
