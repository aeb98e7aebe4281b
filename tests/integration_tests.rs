use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use stream_throttle::infrastructure::mocks::{
    MockCaptureLayer, MockClock, RecordingPolicy, RecordingSubscriber, Signal, TestPublisher,
    TestSubscription,
};
use stream_throttle::{
    AdmissionPolicy, DrainPolicy, Lifecycle, LifecycleState, Metrics, Outcome, Publisher,
    RateLimitedSubscriber, RateLimiter, RateLimiterConfig, Subscriber, Subscription,
};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

/// Subscription honouring demand, shared between a test thread and its emitter.
#[derive(Default)]
struct DemandSubscription {
    requested: AtomicU64,
    cancelled: AtomicBool,
}

impl DemandSubscription {
    /// Wait for one unit of demand. Returns `false` once cancelled.
    fn take_one(&self) -> bool {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            let current = self.requested.load(Ordering::SeqCst);
            if current > 0 {
                let next = if current == u64::MAX { current } else { current - 1 };
                if self
                    .requested
                    .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return true;
                }
            } else {
                thread::yield_now();
            }
        }
    }
}

impl Subscription for DemandSubscription {
    fn request(&self, n: u64) {
        let _ = self
            .requested
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_add(n)));
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Publisher emitting a fixed sequence from its own thread, respecting demand.
struct ThreadPublisher {
    items: Vec<u32>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Arc<DemandSubscription>>>,
}

impl ThreadPublisher {
    fn new(items: Vec<u32>) -> Self {
        Self {
            items,
            workers: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    fn join(&self) {
        for worker in self.workers.lock().unwrap().drain(..) {
            worker.join().unwrap();
        }
    }

    fn was_cancelled(&self) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.cancelled.load(Ordering::SeqCst))
    }
}

impl Publisher<u32, String> for ThreadPublisher {
    fn subscribe<S>(&self, mut subscriber: S)
    where
        S: Subscriber<u32, String> + Send + 'static,
    {
        let subscription = Arc::new(DemandSubscription::default());
        self.subscriptions
            .lock()
            .unwrap()
            .push(Arc::clone(&subscription));
        let items = self.items.clone();

        let worker = thread::spawn(move || {
            subscriber.on_subscribe(subscription.clone());
            for item in items {
                if !subscription.take_one() {
                    return;
                }
                subscriber.on_next(item);
            }
            subscriber.on_complete();
        });
        self.workers.lock().unwrap().push(worker);
    }
}

fn limiter(limit: u32, drain_on: DrainPolicy) -> (Arc<RateLimiter>, Arc<MockClock>) {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let config = RateLimiterConfig::builder()
        .limit_for_period(limit)
        .limit_refresh_period(Duration::from_secs(1))
        .timeout_duration(Duration::ZERO)
        .drain_on(drain_on)
        .build()
        .unwrap();
    let limiter = RateLimiter::with_clock("integration", config, clock.clone()).unwrap();
    (Arc::new(limiter), clock)
}

#[test]
fn test_elements_pass_through_limiter_unchanged() {
    let (limiter, _clock) = limiter(5, DrainPolicy::Never);
    let metrics = Metrics::new();
    let publisher: TestPublisher<u32, String> = TestPublisher::new();
    let downstream = RecordingSubscriber::new();

    let lifecycle = Lifecycle::new();
    let gateway =
        RateLimitedSubscriber::new(Arc::clone(&limiter), downstream.clone(), lifecycle.clone())
            .with_metrics(metrics.clone());
    publisher.subscribe(stream_throttle::BaseSubscriber::new(lifecycle, gateway));

    publisher.emit([1, 2, 3]);
    publisher.complete();

    assert_eq!(
        downstream.signals(),
        vec![
            Signal::Next(1),
            Signal::Next(2),
            Signal::Next(3),
            Signal::Complete
        ]
    );
    // Settlement alone never consumes permits
    assert_eq!(limiter.available_permissions(), 5);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.elements_settled, 3);
    assert_eq!(snapshot.completions, 1);
    assert_eq!(snapshot.total_signals(), 4);
}

#[test]
fn test_failure_in_one_subscription_drains_shared_limiter() {
    let (limiter, clock) = limiter(5, DrainPolicy::OnFailure);
    let failing: TestPublisher<u32, String> = TestPublisher::new();
    let healthy: TestPublisher<u32, String> = TestPublisher::new();
    let failing_downstream = RecordingSubscriber::new();
    let healthy_downstream = RecordingSubscriber::new();

    failing.subscribe(RateLimitedSubscriber::wrap(
        Arc::clone(&limiter),
        failing_downstream.clone(),
    ));
    healthy.subscribe(RateLimitedSubscriber::wrap(
        Arc::clone(&limiter),
        healthy_downstream.clone(),
    ));

    healthy.next(1);
    failing.error("connection reset".to_string());
    healthy.next(2);

    assert_eq!(limiter.available_permissions(), 0);
    // Draining affects future admissions, not elements already flowing
    assert_eq!(healthy_downstream.items(), vec![1, 2]);
    assert_eq!(
        failing_downstream.error(),
        Some("connection reset".to_string())
    );

    clock.advance(Duration::from_secs(1));
    assert_eq!(limiter.available_permissions(), 5);
}

#[test]
fn test_cancel_from_emitter_thread() {
    let publisher = ThreadPublisher::new((1..=10).collect());
    let policy = Arc::new(RecordingPolicy::<u32, String>::new());
    let downstream = RecordingSubscriber::new().cancel_after(3);

    publisher.subscribe(RateLimitedSubscriber::wrap(
        Arc::clone(&policy),
        downstream.clone(),
    ));
    publisher.join();

    assert_eq!(downstream.items(), vec![1, 2, 3]);
    assert_eq!(policy.successes(), vec![1, 2, 3]);
    assert_eq!(downstream.terminal_count(), 0);
    assert!(publisher.was_cancelled());
}

#[test]
fn test_bounded_demand_reaches_threaded_source() {
    let publisher = ThreadPublisher::new(vec![10, 20, 30, 40]);
    let policy = Arc::new(RecordingPolicy::<u32, String>::new());
    let downstream = RecordingSubscriber::with_initial_request(2);

    publisher.subscribe(RateLimitedSubscriber::wrap(
        Arc::clone(&policy),
        downstream.clone(),
    ));

    // The emitter stalls after two elements until more demand arrives
    let deadline = Instant::now() + Duration::from_secs(5);
    while downstream.items().len() < 2 && Instant::now() < deadline {
        thread::yield_now();
    }
    assert_eq!(downstream.items(), vec![10, 20]);

    downstream.request(2);
    publisher.join();

    assert_eq!(downstream.items(), vec![10, 20, 30, 40]);
    assert!(downstream.is_completed());
    assert_eq!(policy.count(), 4);
}

#[test]
fn test_external_cancel_stops_settlement() {
    let publisher: TestPublisher<u32, String> = TestPublisher::new();
    let policy = Arc::new(RecordingPolicy::<u32, String>::new());
    let downstream = RecordingSubscriber::new();

    let subscriber = RateLimitedSubscriber::wrap(Arc::clone(&policy), downstream.clone());
    let lifecycle = subscriber.lifecycle().clone();
    publisher.subscribe(subscriber);

    publisher.next(1);
    let canceller = {
        let lifecycle = lifecycle.clone();
        thread::spawn(move || lifecycle.cancel())
    };
    canceller.join().unwrap();
    publisher.emit([2, 3]);
    publisher.complete();

    assert_eq!(policy.settlements(), vec![Outcome::Success(1)]);
    assert_eq!(downstream.signals(), vec![Signal::Next(1)]);
    assert_eq!(publisher.cancel_count(), 1);
}

const RACE_RUNS: usize = 200;
const RACE_ELEMENTS: u32 = 500;

/// What a cancel raced against an emitting thread left behind.
struct RaceResult {
    policy: Arc<RecordingPolicy<u32, String>>,
    downstream: RecordingSubscriber<u32, String>,
    state: LifecycleState,
    upstream_cancels: usize,
}

/// Emit elements then a terminal signal on one thread while this thread cancels.
///
/// `spin` delays the cancel so it lands at different points of the sequence.
fn race_cancel(terminal: Option<&'static str>, spin: usize) -> RaceResult {
    let mut subscriber = RateLimitedSubscriber::wrap(
        Arc::new(RecordingPolicy::<u32, String>::new()),
        RecordingSubscriber::<u32, String>::new(),
    );
    let policy = Arc::clone(subscriber.hooks().policy());
    let downstream = subscriber.hooks().downstream().clone();
    let lifecycle = subscriber.lifecycle().clone();
    let upstream = Arc::new(TestSubscription::default());
    subscriber.on_subscribe(upstream.clone());

    let start = Arc::new(Barrier::new(2));
    let emitter = {
        let start = Arc::clone(&start);
        thread::spawn(move || {
            start.wait();
            for item in 0..RACE_ELEMENTS {
                subscriber.on_next(item);
            }
            match terminal {
                Some(error) => subscriber.on_error(error.to_string()),
                None => subscriber.on_complete(),
            }
        })
    };

    start.wait();
    for _ in 0..spin {
        std::hint::spin_loop();
    }
    lifecycle.cancel();
    emitter.join().unwrap();

    RaceResult {
        policy,
        downstream,
        state: lifecycle.state(),
        upstream_cancels: upstream.cancel_count(),
    }
}

#[test]
fn test_cancel_racing_elements_and_completion() {
    for run in 0..RACE_RUNS {
        let result = race_cancel(None, run * 37);
        let items = result.downstream.items();

        // Every forwarded element was settled, and nothing else was
        assert_eq!(result.policy.successes(), items);
        assert!(result.policy.failures().is_empty());
        assert!(result.downstream.terminal_count() <= 1);

        match result.state {
            LifecycleState::Terminated => {
                assert!(result.downstream.is_completed());
                assert_eq!(items.len(), RACE_ELEMENTS as usize);
                assert_eq!(result.upstream_cancels, 0);
            }
            LifecycleState::Cancelled => {
                assert_eq!(result.downstream.terminal_count(), 0);
                assert_eq!(result.upstream_cancels, 1);
            }
            LifecycleState::Active => panic!("lifecycle still active after the race"),
        }
    }
}

#[test]
fn test_cancel_racing_elements_and_error() {
    for run in 0..RACE_RUNS {
        let result = race_cancel(Some("upstream failed"), run * 37);
        let failures = result.policy.failures();

        assert_eq!(result.policy.successes(), result.downstream.items());
        assert!(result.downstream.terminal_count() <= 1);
        // A forwarded error was settled exactly once; a dropped one never was
        assert_eq!(failures.len(), result.downstream.terminal_count());
        assert_eq!(result.downstream.error(), failures.first().cloned());

        if result.state == LifecycleState::Cancelled {
            assert!(failures.is_empty());
            assert_eq!(result.upstream_cancels, 1);
        } else {
            assert_eq!(
                result.downstream.error(),
                Some("upstream failed".to_string())
            );
            assert_eq!(
                result.downstream.signals().last(),
                Some(&Signal::Error("upstream failed".to_string()))
            );
        }
    }
}

struct PanickingPolicy;

impl AdmissionPolicy<u32, String> for PanickingPolicy {
    fn settle_outcome(&self, _outcome: Outcome<&u32, &String>) {
        panic!("policy failure");
    }
}

#[test]
fn test_settlement_panic_propagates_before_forwarding() {
    let downstream: RecordingSubscriber<u32, String> = RecordingSubscriber::new();
    let mut subscriber = RateLimitedSubscriber::wrap(Arc::new(PanickingPolicy), downstream.clone());
    subscriber.on_subscribe(Arc::new(Lifecycle::new()));

    let result = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_next(1)));

    assert!(result.is_err());
    assert!(downstream.items().is_empty());
}

#[test]
fn test_rejection_and_cancellation_are_logged() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let (limiter, _clock) = limiter(1, DrainPolicy::Never);

    tracing::subscriber::with_default(subscriber, || {
        assert!(limiter.acquire_permission(1));
        assert!(!limiter.acquire_permission(1));

        let lifecycle = Lifecycle::new();
        lifecycle.cancel();
        lifecycle.cancel();
    });

    let rejected = capture.matching("permits rejected");
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].level, Level::DEBUG);
    assert_eq!(rejected[0].field("limiter"), Some("integration"));

    assert_eq!(capture.matching("subscription cancelled").len(), 1);
}
