//! Manually driven publisher for testing.

use crate::application::ports::{Publisher, Subscriber, Subscription};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Subscription handed out by [`TestPublisher`], recording demand and cancels.
#[derive(Debug, Default)]
pub struct TestSubscription {
    requested: AtomicU64,
    cancel_count: AtomicUsize,
}

impl TestSubscription {
    /// Total demand requested so far, saturating at `u64::MAX`.
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }

    /// Number of times `cancel` was called.
    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }
}

impl Subscription for TestSubscription {
    fn request(&self, n: u64) {
        let _ = self
            .requested
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(n))
            });
    }

    fn cancel(&self) {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
    }
}

type BoxedSubscriber<T, E> = Box<dyn Subscriber<T, E> + Send>;

/// Publisher whose signals are pushed by the test.
///
/// Signals are delivered to the most recent subscriber regardless of demand
/// or earlier terminal signals, so tests can check how the receiving side
/// copes with a misbehaving source.
///
/// # Examples
///
/// ```
/// use stream_throttle::application::ports::Publisher;
/// use stream_throttle::infrastructure::mocks::{RecordingSubscriber, TestPublisher};
///
/// let publisher: TestPublisher<u32, String> = TestPublisher::new();
/// let subscriber = RecordingSubscriber::new();
/// publisher.subscribe(subscriber.clone());
///
/// publisher.emit([1, 2]);
/// publisher.complete();
///
/// assert_eq!(subscriber.items(), vec![1, 2]);
/// assert!(subscriber.is_completed());
/// ```
pub struct TestPublisher<T, E> {
    subscriber: Mutex<Option<BoxedSubscriber<T, E>>>,
    subscription: Arc<TestSubscription>,
    subscribe_count: AtomicUsize,
}

impl<T, E> TestPublisher<T, E> {
    /// Create a publisher with no subscriber.
    pub fn new() -> Self {
        Self {
            subscriber: Mutex::new(None),
            subscription: Arc::new(TestSubscription::default()),
            subscribe_count: AtomicUsize::new(0),
        }
    }

    /// The subscription handed to subscribers.
    pub fn subscription(&self) -> Arc<TestSubscription> {
        Arc::clone(&self.subscription)
    }

    /// Total demand requested by subscribers.
    pub fn requested(&self) -> u64 {
        self.subscription.requested()
    }

    /// Check if any subscriber cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.subscription.cancel_count() > 0
    }

    /// Number of cancellations received.
    pub fn cancel_count(&self) -> usize {
        self.subscription.cancel_count()
    }

    /// Number of subscribers accepted.
    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    fn with_subscriber(&self, f: impl FnOnce(&mut BoxedSubscriber<T, E>)) {
        let mut slot = self
            .subscriber
            .lock()
            .expect("TestPublisher mutex poisoned");
        if let Some(subscriber) = slot.as_mut() {
            f(subscriber);
        }
    }

    /// Push one element.
    pub fn next(&self, item: T) {
        self.with_subscriber(|s| s.on_next(item));
    }

    /// Push every element of `items` in order.
    pub fn emit(&self, items: impl IntoIterator<Item = T>) {
        self.with_subscriber(|s| {
            for item in items {
                s.on_next(item);
            }
        });
    }

    /// Signal a failure.
    pub fn error(&self, error: E) {
        self.with_subscriber(|s| s.on_error(error));
    }

    /// Signal completion.
    pub fn complete(&self) {
        self.with_subscriber(|s| s.on_complete());
    }
}

impl<T, E> Default for TestPublisher<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Publisher<T, E> for TestPublisher<T, E> {
    fn subscribe<S>(&self, mut subscriber: S)
    where
        S: Subscriber<T, E> + Send + 'static,
    {
        subscriber.on_subscribe(self.subscription() as Arc<dyn Subscription>);
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        *self
            .subscriber
            .lock()
            .expect("TestPublisher mutex poisoned") = Some(Box::new(subscriber));
    }
}
