//! Async stream integration.
//!
//! [`RateLimitedStream`] applies the gateway rules to a pull-based
//! `futures::Stream` of `Result<T, E>`:
//! - `Ok(item)` is settled as a success, then yielded
//! - `Err(error)` is settled as a failure, yielded, and ends the stream
//! - the inner stream ending ends this stream without a settlement
//!
//! Cancelling through a [`CancelHandle`] ends the stream at its next poll and
//! wakes a task that is waiting on it. Items the inner stream produces after
//! cancellation are dropped without settlement.

use crate::application::lifecycle::Lifecycle;
use crate::application::metrics::Metrics;
use crate::application::ports::AdmissionPolicy;
use crate::domain::outcome::Outcome;
use futures::stream::{FusedStream, Stream};
use futures::task::AtomicWaker;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tracing::debug;

/// Handle that cancels a [`RateLimitedStream`] from outside the consuming task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    lifecycle: Lifecycle,
    waker: Arc<AtomicWaker>,
}

impl CancelHandle {
    /// Cancel the stream. Idempotent.
    pub fn cancel(&self) {
        self.lifecycle.cancel();
        self.waker.wake();
    }

    /// Check if the stream was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.lifecycle.is_cancelled()
    }

    /// The lifecycle shared with the stream.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

/// A stream whose items are settled with an admission policy before they are
/// yielded.
pub struct RateLimitedStream<S, P: ?Sized> {
    inner: S,
    policy: Arc<P>,
    lifecycle: Lifecycle,
    waker: Arc<AtomicWaker>,
    metrics: Metrics,
}

impl<S, P: ?Sized> RateLimitedStream<S, P> {
    /// Wrap `inner`, settling every item with `policy`.
    pub fn new(inner: S, policy: Arc<P>) -> Self {
        Self {
            inner,
            policy,
            lifecycle: Lifecycle::new(),
            waker: Arc::new(AtomicWaker::new()),
            metrics: Metrics::new(),
        }
    }

    /// Record counters into shared metrics.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get a handle that can cancel this stream.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            lifecycle: self.lifecycle.clone(),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get a reference to the inner stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Consume the adapter, returning the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, P, T, E> Stream for RateLimitedStream<S, P>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    P: AdmissionPolicy<T, E> + ?Sized,
{
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.waker.register(cx.waker());

        if this.lifecycle.is_terminated() {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(item)) => {
                if this.lifecycle.is_terminated() {
                    this.metrics.record_dropped();
                    debug!(state = ?this.lifecycle.state(), "dropping element after termination");
                    return Poll::Ready(None);
                }
                this.policy.settle_outcome(Outcome::Success(&item));
                this.metrics.record_settled();
                Poll::Ready(Some(Ok(item)))
            }
            Some(Err(error)) => {
                if !this.lifecycle.terminate() {
                    debug!(state = ?this.lifecycle.state(), "error dropped after termination");
                    return Poll::Ready(None);
                }
                this.policy.settle_outcome(Outcome::Failure(&error));
                this.metrics.record_failure();
                Poll::Ready(Some(Err(error)))
            }
            None => {
                if this.lifecycle.terminate() {
                    this.metrics.record_completion();
                }
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.lifecycle.is_terminated() {
            (0, Some(0))
        } else {
            (0, self.inner.size_hint().1)
        }
    }
}

impl<S, P, T, E> FusedStream for RateLimitedStream<S, P>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    P: AdmissionPolicy<T, E> + ?Sized,
{
    fn is_terminated(&self) -> bool {
        self.lifecycle.is_terminated()
    }
}

impl<S: std::fmt::Debug, P: ?Sized> std::fmt::Debug for RateLimitedStream<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedStream")
            .field("inner", &self.inner)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// Extension trait adding `rate_limited` to result streams.
pub trait RateLimitExt<T, E>: Stream<Item = Result<T, E>> + Unpin + Sized {
    /// Settle every item with `policy` before yielding it.
    fn rate_limited<P>(self, policy: Arc<P>) -> RateLimitedStream<Self, P>
    where
        P: AdmissionPolicy<T, E> + ?Sized,
    {
        RateLimitedStream::new(self, policy)
    }
}

impl<S, T, E> RateLimitExt<T, E> for S where S: Stream<Item = Result<T, E>> + Unpin {}
