//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.
//!
//! Three groups live here:
//! - The streaming protocol (`Publisher`, `Subscriber`, `Subscription`)
//! - The admission-control policy (`AdmissionPolicy`, `PermitSource`)
//! - Runtime services (`Clock`, `Storage`)

use crate::domain::outcome::Outcome;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handle a subscriber uses to signal demand or cancel.
///
/// Both operations may be called from any thread, including from inside a
/// signal callback. Implementations must make `cancel` idempotent.
pub trait Subscription: Send + Sync {
    /// Request `n` more elements. Zero is ignored.
    fn request(&self, n: u64);

    /// Stop receiving signals and release resources.
    fn cancel(&self);
}

/// Consumer side of a backpressured stream.
///
/// Signals for one subscription are delivered serially: `on_subscribe` first,
/// then any number of `on_next` calls, then at most one of `on_error` or
/// `on_complete`.
pub trait Subscriber<T, E> {
    /// Receive the subscription handle before any other signal.
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>);

    /// Receive an element.
    fn on_next(&mut self, item: T);

    /// Receive the terminal failure.
    fn on_error(&mut self, error: E);

    /// Receive the terminal completion.
    fn on_complete(&mut self);
}

/// Producer side of a backpressured stream.
pub trait Publisher<T, E> {
    /// Start a new subscription delivering to `subscriber`.
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<T, E> + Send + 'static;
}

/// Port for settling outcomes with an admission-control policy.
///
/// The gateway calls `settle_outcome` once per delivered element and once per
/// failure, before forwarding the signal downstream. The policy is shared by
/// every subscription using it and owns its own concurrency discipline.
///
/// Settlement is fire-and-forget: the gateway never retries it, and a panic
/// raised here unwinds through the gateway untouched.
pub trait AdmissionPolicy<T, E>: Send + Sync {
    /// Record the outcome of a signal.
    fn settle_outcome(&self, outcome: Outcome<&T, &E>);
}

/// Port for acquiring permits before a subscription starts.
pub trait PermitSource: Send + Sync {
    /// Acquire `permits`, blocking the calling thread for at most the source's
    /// configured timeout.
    ///
    /// Returns `false` if the permits could not be acquired in time.
    fn acquire_permission(&self, permits: u32) -> bool;

    /// Reserve `permits` without waiting.
    ///
    /// Returns how long the caller must wait before using them, or `None` if
    /// that wait would exceed the timeout.
    fn reserve_permission(&self, permits: u32) -> Option<Duration>;

    /// Name used in diagnostics and rejection errors.
    fn name(&self) -> &str;
}

/// Port for obtaining current time.
///
/// This abstraction allows permit accounting to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for concurrent key-value storage.
///
/// Infrastructure provides concrete implementations (ShardedStorage).
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Read an existing entry without creating it.
    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R;

    /// Remove an entry, returning its value.
    fn remove(&self, key: &K) -> Option<V>;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries, providing access to both key and value.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);
}
