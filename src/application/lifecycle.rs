//! Subscription lifecycle shared by every rate-limited subscriber.
//!
//! [`Lifecycle`] owns the termination state of one subscription and the
//! upstream subscription handle. [`BaseSubscriber`] sits on the upstream side,
//! enforces the protocol rules (one hook per signal, nothing after a terminal
//! signal, nothing after cancellation) and dispatches to a set of
//! [`SubscriberHooks`].

use crate::application::ports::{Subscriber, Subscription};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

/// Termination state of a subscription.
///
/// The only transitions are out of `Active`; a terminated or cancelled
/// subscription never becomes active again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Signals flow normally
    Active = 0,
    /// Cancelled by the downstream or an external actor
    Cancelled = 1,
    /// A terminal signal (error or completion) was observed
    Terminated = 2,
}

impl From<u8> for LifecycleState {
    fn from(value: u8) -> Self {
        match value {
            0 => LifecycleState::Active,
            1 => LifecycleState::Cancelled,
            _ => LifecycleState::Terminated,
        }
    }
}

struct LifecycleInner {
    state: AtomicU8,
    upstream: OnceLock<Arc<dyn Subscription>>,
    upstream_cancelled: AtomicBool,
    pending_demand: AtomicU64,
}

/// Shared handle to the state of one subscription.
///
/// Cloning is cheap and every clone observes the same state. The lifecycle is
/// also the [`Subscription`] handed to the downstream subscriber, so
/// downstream demand and cancellation flow through it.
///
/// # Example
/// ```
/// use stream_throttle::{Lifecycle, LifecycleState};
///
/// let lifecycle = Lifecycle::new();
/// assert!(!lifecycle.is_terminated());
///
/// lifecycle.cancel();
/// lifecycle.cancel(); // idempotent
/// assert_eq!(lifecycle.state(), LifecycleState::Cancelled);
/// assert!(lifecycle.is_terminated());
/// ```
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

impl Lifecycle {
    /// Create an active lifecycle with no upstream attached yet.
    pub fn new() -> Self {
        Self::with_state(LifecycleState::Active)
    }

    /// Create a lifecycle that has already terminated.
    ///
    /// Handed to a subscriber that is rejected before any upstream exists.
    pub fn terminated() -> Self {
        Self::with_state(LifecycleState::Terminated)
    }

    fn with_state(state: LifecycleState) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                state: AtomicU8::new(state as u8),
                upstream: OnceLock::new(),
                upstream_cancelled: AtomicBool::new(false),
                pending_demand: AtomicU64::new(0),
            }),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from(self.inner.state.load(Ordering::Acquire))
    }

    /// Check if the subscription was cancelled or observed a terminal signal.
    ///
    /// Monotonic: once true, stays true.
    pub fn is_terminated(&self) -> bool {
        self.state() != LifecycleState::Active
    }

    /// Check if the subscription was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state() == LifecycleState::Cancelled
    }

    /// Cancel the subscription.
    ///
    /// Only the first call on an active lifecycle has any effect. The upstream
    /// subscription, if attached, is cancelled exactly once.
    pub fn cancel(&self) {
        if self.transition(LifecycleState::Cancelled) {
            debug!("subscription cancelled");
            self.cancel_upstream();
        }
    }

    /// Request `n` more elements from upstream.
    ///
    /// Demand requested before upstream is attached is held and forwarded
    /// once it arrives. Ignored after termination.
    pub fn request(&self, n: u64) {
        if n == 0 || self.is_terminated() {
            return;
        }

        match self.inner.upstream.get() {
            Some(upstream) => upstream.request(n),
            None => {
                add_demand(&self.inner.pending_demand, n);
                // Upstream may have been attached between the check and the add
                self.flush_pending_demand();
            }
        }
    }

    /// Record a terminal signal.
    ///
    /// Returns `true` if this call moved the lifecycle out of `Active`.
    pub(crate) fn terminate(&self) -> bool {
        self.transition(LifecycleState::Terminated)
    }

    /// Attach the upstream subscription.
    ///
    /// Returns `false` if the subscription must not proceed: either an
    /// upstream was already attached, or the lifecycle is no longer active.
    /// In both cases the offered subscription is cancelled.
    pub(crate) fn attach_upstream(&self, upstream: Arc<dyn Subscription>) -> bool {
        if self.inner.upstream.set(Arc::clone(&upstream)).is_err() {
            warn!("upstream subscription already attached, cancelling duplicate");
            upstream.cancel();
            return false;
        }

        if self.is_terminated() {
            trace!("upstream attached after termination");
            self.cancel_upstream();
            return false;
        }

        self.flush_pending_demand();
        true
    }

    fn transition(&self, to: LifecycleState) -> bool {
        self.inner
            .state
            .compare_exchange(
                LifecycleState::Active as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn cancel_upstream(&self) {
        if let Some(upstream) = self.inner.upstream.get() {
            if !self.inner.upstream_cancelled.swap(true, Ordering::AcqRel) {
                upstream.cancel();
            }
        }
    }

    fn flush_pending_demand(&self) {
        if let Some(upstream) = self.inner.upstream.get() {
            let pending = self.inner.pending_demand.swap(0, Ordering::AcqRel);
            if pending > 0 {
                upstream.request(pending);
            }
        }
    }
}

fn add_demand(demand: &AtomicU64, n: u64) {
    let mut current = demand.load(Ordering::Acquire);
    loop {
        let next = current.saturating_add(n);
        match demand.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .field("upstream_attached", &self.inner.upstream.get().is_some())
            .finish()
    }
}

impl Subscription for Lifecycle {
    fn request(&self, n: u64) {
        Lifecycle::request(self, n)
    }

    fn cancel(&self) {
        Lifecycle::cancel(self)
    }
}

/// Hook points a [`BaseSubscriber`] dispatches to.
///
/// Each upstream signal reaches exactly one hook, in arrival order, and never
/// concurrently. `hook_on_error` and `hook_on_complete` are each the last hook
/// to fire.
pub trait SubscriberHooks<T, E> {
    /// The downstream-facing subscription is ready.
    fn hook_on_subscribe(&mut self, subscription: Arc<dyn Subscription>);

    /// An element arrived while the subscription was active.
    fn hook_on_next(&mut self, item: T);

    /// Upstream failed.
    fn hook_on_error(&mut self, error: E);

    /// Upstream completed.
    fn hook_on_complete(&mut self);
}

/// Upstream-facing subscriber that enforces the streaming protocol.
pub struct BaseSubscriber<H> {
    lifecycle: Lifecycle,
    hooks: H,
}

impl<H> BaseSubscriber<H> {
    /// Create a subscriber driving `hooks` under `lifecycle`.
    pub fn new(lifecycle: Lifecycle, hooks: H) -> Self {
        Self { lifecycle, hooks }
    }

    /// Get the lifecycle of this subscription.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Get a reference to the hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }
}

impl<T, E, H> Subscriber<T, E> for BaseSubscriber<H>
where
    H: SubscriberHooks<T, E>,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.lifecycle.attach_upstream(subscription) {
            self.hooks
                .hook_on_subscribe(Arc::new(self.lifecycle.clone()));
        }
    }

    fn on_next(&mut self, item: T) {
        if self.lifecycle.is_terminated() {
            trace!(state = ?self.lifecycle.state(), "element arrived after termination");
            return;
        }
        self.hooks.hook_on_next(item);
    }

    fn on_error(&mut self, error: E) {
        if self.lifecycle.terminate() {
            self.hooks.hook_on_error(error);
        } else {
            debug!(state = ?self.lifecycle.state(), "error dropped after termination");
        }
    }

    fn on_complete(&mut self) {
        if self.lifecycle.terminate() {
            self.hooks.hook_on_complete();
        } else {
            debug!(state = ?self.lifecycle.state(), "completion dropped after termination");
        }
    }
}

impl<H: std::fmt::Debug> std::fmt::Debug for BaseSubscriber<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseSubscriber")
            .field("lifecycle", &self.lifecycle)
            .field("hooks", &self.hooks)
            .finish()
    }
}
