//! The rate-limited gateway.
//!
//! [`RateLimitedSubscriber`] sits between an upstream source and a downstream
//! subscriber. Every element is settled with the admission-control policy as a
//! success before it is forwarded, every failure is settled as a failure
//! before it is forwarded, and completion is forwarded as is.
//!
//! The gateway relies on [`BaseSubscriber`] for protocol enforcement. It adds
//! one check of its own: an element that reaches it after the subscription has
//! terminated (typically a cancellation racing an in-flight element) is
//! dropped without settlement.

use crate::application::lifecycle::{BaseSubscriber, Lifecycle, SubscriberHooks};
use crate::application::metrics::Metrics;
use crate::application::ports::{AdmissionPolicy, Subscriber, Subscription};
use crate::domain::outcome::Outcome;
use std::sync::Arc;
use tracing::debug;

/// Gateway hooks for one subscription.
///
/// Generic over the policy `P` (usually shared by many subscriptions, so held
/// in an `Arc`) and the downstream subscriber `D`.
///
/// # Example
/// ```
/// use stream_throttle::{
///     AdmissionPolicy, Outcome, RateLimitedSubscriber, Subscriber, Subscription,
/// };
/// use std::sync::{Arc, Mutex};
///
/// #[derive(Default)]
/// struct CountingPolicy(Mutex<(u32, u32)>);
///
/// impl AdmissionPolicy<u32, String> for CountingPolicy {
///     fn settle_outcome(&self, outcome: Outcome<&u32, &String>) {
///         let mut counts = self.0.lock().unwrap();
///         match outcome {
///             Outcome::Success(_) => counts.0 += 1,
///             Outcome::Failure(_) => counts.1 += 1,
///         }
///     }
/// }
///
/// struct Sink;
///
/// impl Subscriber<u32, String> for Sink {
///     fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
///         subscription.request(u64::MAX);
///     }
///     fn on_next(&mut self, _item: u32) {}
///     fn on_error(&mut self, _error: String) {}
///     fn on_complete(&mut self) {}
/// }
///
/// let policy = Arc::new(CountingPolicy::default());
/// let mut subscriber = RateLimitedSubscriber::wrap(Arc::clone(&policy), Sink);
///
/// subscriber.on_next(1);
/// subscriber.on_next(2);
/// subscriber.on_error("upstream failed".to_string());
///
/// assert_eq!(*policy.0.lock().unwrap(), (2, 1));
/// ```
pub struct RateLimitedSubscriber<P: ?Sized, D> {
    policy: Arc<P>,
    downstream: D,
    lifecycle: Lifecycle,
    metrics: Metrics,
}

impl<P: ?Sized, D> RateLimitedSubscriber<P, D> {
    /// Create gateway hooks bound to an existing lifecycle.
    ///
    /// # Arguments
    /// * `policy` - The admission-control policy to settle outcomes with
    /// * `downstream` - The subscriber receiving forwarded signals
    /// * `lifecycle` - Termination state of this subscription
    pub fn new(policy: Arc<P>, downstream: D, lifecycle: Lifecycle) -> Self {
        Self {
            policy,
            downstream,
            lifecycle,
            metrics: Metrics::new(),
        }
    }

    /// Record counters into shared metrics.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Build a complete upstream-facing subscriber around `downstream`.
    ///
    /// Creates a fresh lifecycle for the new subscription.
    pub fn wrap(policy: Arc<P>, downstream: D) -> BaseSubscriber<Self> {
        let lifecycle = Lifecycle::new();
        BaseSubscriber::new(lifecycle.clone(), Self::new(policy, downstream, lifecycle))
    }

    /// Get a reference to the policy.
    pub fn policy(&self) -> &Arc<P> {
        &self.policy
    }

    /// Get a reference to the downstream subscriber.
    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    /// Get the lifecycle of this subscription.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl<T, E, P, D> SubscriberHooks<T, E> for RateLimitedSubscriber<P, D>
where
    P: AdmissionPolicy<T, E> + ?Sized,
    D: Subscriber<T, E>,
{
    fn hook_on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.downstream.on_subscribe(subscription);
    }

    fn hook_on_next(&mut self, item: T) {
        // Cancellation may have landed after the base subscriber let this through
        if self.lifecycle.is_terminated() {
            self.metrics.record_dropped();
            debug!(state = ?self.lifecycle.state(), "dropping element after termination");
            return;
        }

        // Settle first: downstream must observe post-settlement capacity
        self.policy.settle_outcome(Outcome::Success(&item));
        self.metrics.record_settled();
        self.downstream.on_next(item);
    }

    fn hook_on_error(&mut self, error: E) {
        self.policy.settle_outcome(Outcome::Failure(&error));
        self.metrics.record_failure();
        self.downstream.on_error(error);
    }

    fn hook_on_complete(&mut self) {
        self.metrics.record_completion();
        self.downstream.on_complete();
    }
}

impl<P: ?Sized, D: std::fmt::Debug> std::fmt::Debug for RateLimitedSubscriber<P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedSubscriber")
            .field("downstream", &self.downstream)
            .field("lifecycle", &self.lifecycle)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
