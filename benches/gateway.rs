use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use stream_throttle::{
    AdmissionPolicy, DrainPolicy, Outcome, RateLimitedSubscriber, RateLimiter, RateLimiterConfig,
    RateLimiterRegistry, ShardedStorage, Subscriber, Subscription, SystemClock,
};

/// Downstream that only counts what it receives.
struct Sink(u64);

impl Subscriber<u64, String> for Sink {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        subscription.request(u64::MAX);
    }

    fn on_next(&mut self, item: u64) {
        self.0 = self.0.wrapping_add(item);
    }

    fn on_error(&mut self, _error: String) {}

    fn on_complete(&mut self) {}
}

/// Policy that does nothing, isolating gateway overhead.
struct NoopPolicy;

impl AdmissionPolicy<u64, String> for NoopPolicy {
    fn settle_outcome(&self, outcome: Outcome<&u64, &String>) {
        black_box(outcome);
    }
}

fn limiter(limit: u32, drain_on: DrainPolicy) -> Arc<RateLimiter> {
    let config = RateLimiterConfig::builder()
        .limit_for_period(limit)
        .limit_refresh_period(Duration::from_millis(1))
        .timeout_duration(Duration::ZERO)
        .drain_on(drain_on)
        .build()
        .unwrap();
    Arc::new(RateLimiter::new("bench", config).unwrap())
}

/// Benchmark per-element cost of settle-then-forward
fn bench_gateway_on_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("gateway_on_next");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("noop_policy", |b| {
        b.iter(|| {
            let mut subscriber = RateLimitedSubscriber::wrap(Arc::new(NoopPolicy), Sink(0));
            subscriber.on_subscribe(Arc::new(stream_throttle::Lifecycle::new()));
            for i in 0..1000u64 {
                subscriber.on_next(black_box(i));
            }
        })
    });

    for (name, drain_on) in [
        ("rate_limiter_never_drain", DrainPolicy::Never),
        ("rate_limiter_drain_on_success", DrainPolicy::OnSuccess),
    ] {
        let limiter = limiter(1_000, drain_on);
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut subscriber = RateLimitedSubscriber::wrap(Arc::clone(&limiter), Sink(0));
                subscriber.on_subscribe(Arc::new(stream_throttle::Lifecycle::new()));
                for i in 0..1000u64 {
                    subscriber.on_next(black_box(i));
                }
            })
        });
    }

    group.finish();
}

/// Benchmark permit acquisition under contention
fn bench_concurrent_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_acquire");

    for num_threads in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*num_threads as u64) * 1000));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                let limiter = limiter(u32::MAX, DrainPolicy::Never);
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let limiter = Arc::clone(&limiter);
                            std::thread::spawn(move || {
                                for _ in 0..1000 {
                                    black_box(limiter.acquire_permission(1));
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark registry lookup with different numbers of named limiters
fn bench_registry_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup");

    for size in [10, 1_000, 10_000].iter() {
        let registry = RateLimiterRegistry::new(
            Arc::new(ShardedStorage::new()),
            Arc::new(SystemClock::new()),
            RateLimiterConfig::default(),
        )
        .unwrap();
        let names: Vec<String> = (0..*size).map(|i| format!("limiter-{}", i)).collect();
        for name in &names {
            registry.rate_limiter(name);
        }

        group.bench_with_input(BenchmarkId::new("limiters", size), size, |b, _| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % names.len();
                black_box(registry.rate_limiter(black_box(&names[i])))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_gateway_on_next,
    bench_concurrent_acquire,
    bench_registry_lookup,
);
criterion_main!(benches);
