//! Resilience benchmarks
//!
//! Hot paths of the breaker gate, the backoff calculation and the composed
//! resilient call on the success and short-circuit paths.
//!
//! Run with: `cargo bench --bench resilience_bench -p breakwater-common`

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use breakwater_common::resilience::{
    apply_jitter, CallContext, CircuitBreaker, CircuitBreakerConfig, FixedRandom, MockClock,
    NoopObserver, ResilienceError, ResilientCall, ResilientConfig, Retrier, RetryPolicy,
    SystemClock,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;

#[derive(Debug, Clone)]
struct BenchError(&'static str);

impl Display for BenchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for BenchError {}

fn quiet_breaker(config: CircuitBreakerConfig) -> CircuitBreaker<MockClock> {
    CircuitBreaker::with_observer("bench", config, MockClock::new(), Arc::new(NoopObserver))
        .expect("valid circuit breaker config for benchmarks")
}

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_paths");

    group.bench_function("call_success", |b| {
        let breaker = quiet_breaker(CircuitBreakerConfig::default());
        b.iter(|| {
            let result: Result<_, ResilienceError<BenchError>> = breaker.call(|| Ok(()));
            if let Err(err) = result {
                panic!("circuit breaker success path failed: {err}");
            }
        });
    });

    group.bench_function("trip_to_open", |b| {
        b.iter(|| {
            let breaker = quiet_breaker(CircuitBreakerConfig::default());
            for _ in 0..5 {
                let result: Result<(), _> = breaker.call(|| Err(BenchError("benchmark failure")));
                let _result = black_box(result);
            }
            black_box(breaker.state());
        });
    });

    group.bench_function("open_short_circuit", |b| {
        let config = CircuitBreakerConfig::builder()
            .max_failures(1)
            .reset_timeout(Duration::from_secs(3600))
            .build()
            .expect("valid circuit breaker config for benchmarks");
        let breaker = quiet_breaker(config);
        breaker.record_failure();

        b.iter(|| black_box(breaker.try_acquire()));
    });

    group.finish();
}

// ============================================================================
// Retry Benchmarks
// ============================================================================

fn bench_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_backoff");
    let policy = RetryPolicy::default();
    let retrier = Retrier::new(policy.clone());

    for retry in [0u32, 4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("backoff_delay", retry), &retry, |b, &retry| {
            b.iter(|| black_box(policy.backoff_delay(black_box(retry))));
        });
        group.bench_with_input(BenchmarkId::new("jittered", retry), &retry, |b, &retry| {
            b.iter(|| black_box(retrier.next_delay(black_box(retry))));
        });
    }

    group.bench_function("apply_jitter", |b| {
        b.iter(|| black_box(apply_jitter(black_box(Duration::from_millis(800)), black_box(0.37))));
    });

    group.finish();
}

// ============================================================================
// Resilient Call Benchmarks
// ============================================================================

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

fn bench_resilient_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("resilient_call");
    let runtime = build_runtime();

    group.bench_function("success_first_attempt", |b| {
        let call = ResilientCall::with_parts(
            "bench",
            &ResilientConfig::default(),
            SystemClock,
            Arc::new(NoopObserver),
        )
        .expect("valid resilient config for benchmarks")
        .with_random(Arc::new(FixedRandom(0.5)));
        let ctx = CallContext::new();

        b.to_async(&runtime).iter(|| async {
            let result = call.call(&ctx, |_attempt| async { Ok::<_, BenchError>(42) }).await;
            black_box(result)
        });
    });

    group.bench_function("short_circuit", |b| {
        let config = ResilientConfig {
            max_failures: 1,
            retry_max_attempts: 1,
            reset_timeout: Duration::from_secs(3600),
            ..ResilientConfig::default()
        };
        let call = ResilientCall::with_parts("bench", &config, SystemClock, Arc::new(NoopObserver))
            .expect("valid resilient config for benchmarks");
        call.breaker().record_failure();
        let ctx = CallContext::new();

        b.to_async(&runtime).iter(|| async {
            let result =
                call.call(&ctx, |_attempt| async { Err::<(), _>(BenchError("unreachable")) }).await;
            black_box(result)
        });
    });

    group.finish();
}

criterion_group!(resilience, bench_circuit_breaker_paths, bench_backoff, bench_resilient_call);
criterion_main!(resilience);
