//! Rate-limiting operator for publishers.
//!
//! Each subscription must first acquire a permit. A granted subscription is
//! routed through the gateway; a refused one never reaches the source and the
//! subscriber receives a `RequestNotPermitted` error instead.

use crate::application::gateway::RateLimitedSubscriber;
use crate::application::lifecycle::{BaseSubscriber, Lifecycle};
use crate::application::metrics::Metrics;
use crate::application::ports::{AdmissionPolicy, PermitSource, Publisher, Subscriber};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Error delivered to a subscriber that could not acquire a permit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestNotPermitted {
    limiter: String,
}

impl RequestNotPermitted {
    /// Create the error for the named limiter.
    pub fn new(limiter: impl Into<String>) -> Self {
        Self {
            limiter: limiter.into(),
        }
    }

    /// Name of the limiter that refused the subscription.
    pub fn limiter(&self) -> &str {
        &self.limiter
    }
}

impl fmt::Display for RequestNotPermitted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate limiter '{}' does not permit further calls",
            self.limiter
        )
    }
}

impl std::error::Error for RequestNotPermitted {}

/// A publisher whose subscriptions pass through a rate limiter.
///
/// `Publisher::subscribe` waits for a permit on the calling thread, for at
/// most the limiter's timeout. Inside an async runtime use `subscribe_async`
/// (with the `async` feature), which waits without blocking a worker.
pub struct RateLimitedPublisher<S, L: ?Sized> {
    source: S,
    limiter: Arc<L>,
    metrics: Metrics,
}

impl<S, L: ?Sized> RateLimitedPublisher<S, L> {
    /// Wrap `source` so that every subscription is admitted by `limiter`.
    pub fn new(source: S, limiter: Arc<L>) -> Self {
        Self {
            source,
            limiter,
            metrics: Metrics::new(),
        }
    }

    /// Record counters for all subscriptions into shared metrics.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get a reference to the limiter.
    pub fn limiter(&self) -> &Arc<L> {
        &self.limiter
    }

    /// Get a reference to the wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S, L: ?Sized + 'static> RateLimitedPublisher<S, L> {
    /// Subscribe once a permit is available, waiting asynchronously.
    ///
    /// The permit is reserved immediately; only the wait for it is deferred.
    #[cfg(feature = "async")]
    pub async fn subscribe_async<T, E, D>(&self, subscriber: D)
    where
        S: Publisher<T, E>,
        L: AdmissionPolicy<T, E> + PermitSource,
        E: From<RequestNotPermitted>,
        D: Subscriber<T, E> + Send + 'static,
    {
        match self.limiter.reserve_permission(1) {
            Some(wait) => {
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                self.admit(subscriber);
            }
            None => self.reject(subscriber),
        }
    }

    fn admit<T, E, D>(&self, subscriber: D)
    where
        S: Publisher<T, E>,
        L: AdmissionPolicy<T, E>,
        D: Subscriber<T, E> + Send + 'static,
    {
        let lifecycle = Lifecycle::new();
        let gateway =
            RateLimitedSubscriber::new(Arc::clone(&self.limiter), subscriber, lifecycle.clone())
                .with_metrics(self.metrics.clone());
        self.source.subscribe(BaseSubscriber::new(lifecycle, gateway));
    }

    fn reject<T, E, D>(&self, mut subscriber: D)
    where
        L: PermitSource,
        E: From<RequestNotPermitted>,
        D: Subscriber<T, E>,
    {
        self.metrics.record_rejected();
        debug!(limiter = %self.limiter.name(), "subscription rejected");
        subscriber.on_subscribe(Arc::new(Lifecycle::terminated()));
        subscriber.on_error(E::from(RequestNotPermitted::new(self.limiter.name())));
    }
}

impl<T, E, S, L> Publisher<T, E> for RateLimitedPublisher<S, L>
where
    S: Publisher<T, E>,
    L: AdmissionPolicy<T, E> + PermitSource + ?Sized + 'static,
    E: From<RequestNotPermitted>,
{
    fn subscribe<D>(&self, subscriber: D)
    where
        D: Subscriber<T, E> + Send + 'static,
    {
        if self.limiter.acquire_permission(1) {
            self.admit(subscriber);
        } else {
            self.reject(subscriber);
        }
    }
}

/// Extension trait adding `rate_limited` to every publisher.
pub trait RateLimitPublisherExt<T, E>: Publisher<T, E> + Sized {
    /// Admit every subscription through `limiter`.
    fn rate_limited<L>(self, limiter: Arc<L>) -> RateLimitedPublisher<Self, L>
    where
        L: AdmissionPolicy<T, E> + PermitSource + ?Sized,
    {
        RateLimitedPublisher::new(self, limiter)
    }
}

impl<T, E, P> RateLimitPublisherExt<T, E> for P where P: Publisher<T, E> {}
