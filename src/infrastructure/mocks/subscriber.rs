//! Recording subscriber for testing.

use crate::application::ports::{Subscriber, Subscription};
use super::signal::Signal;
use std::sync::{Arc, Mutex, MutexGuard};

type Inspector<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Recorded<T, E> {
    signals: Vec<Signal<T, E>>,
    subscription: Option<Arc<dyn Subscription>>,
    received: usize,
}

/// Subscriber that records every signal it receives.
///
/// Clones share the same record, so a test can hand one clone to a publisher
/// and inspect another.
pub struct RecordingSubscriber<T, E> {
    recorded: Arc<Mutex<Recorded<T, E>>>,
    initial_request: u64,
    cancel_after: Option<usize>,
    inspector: Option<Inspector<T>>,
}

impl<T, E> RecordingSubscriber<T, E> {
    /// Create a subscriber requesting unbounded demand on subscribe.
    pub fn new() -> Self {
        Self::with_initial_request(u64::MAX)
    }

    /// Create a subscriber requesting `n` elements on subscribe.
    pub fn with_initial_request(n: u64) -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Recorded {
                signals: Vec::new(),
                subscription: None,
                received: 0,
            })),
            initial_request: n,
            cancel_after: None,
            inspector: None,
        }
    }

    /// Cancel from inside `on_next` once `n` elements have arrived.
    pub fn cancel_after(mut self, n: usize) -> Self {
        self.cancel_after = Some(n);
        self
    }

    /// Run `f` on each element as it arrives, before it is recorded.
    pub fn inspect<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inspector = Some(Arc::new(f));
        self
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded<T, E>> {
        self.recorded
            .lock()
            .expect("RecordingSubscriber mutex poisoned")
    }

    fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.recorded().subscription.clone()
    }

    /// Check if `on_subscribe` was received.
    pub fn is_subscribed(&self) -> bool {
        self.recorded().subscription.is_some()
    }

    /// Request more elements through the received subscription.
    pub fn request(&self, n: u64) {
        if let Some(subscription) = self.subscription() {
            subscription.request(n);
        }
    }

    /// Cancel through the received subscription.
    pub fn cancel(&self) {
        if let Some(subscription) = self.subscription() {
            subscription.cancel();
        }
    }

    /// Number of terminal signals received.
    pub fn terminal_count(&self) -> usize {
        self.recorded()
            .signals
            .iter()
            .filter(|s| s.is_terminal())
            .count()
    }

    /// Check if completion was received.
    pub fn is_completed(&self) -> bool {
        self.recorded()
            .signals
            .iter()
            .any(|s| matches!(s, Signal::Complete))
    }
}

impl<T: Clone, E: Clone> RecordingSubscriber<T, E> {
    /// Every signal received, in order.
    pub fn signals(&self) -> Vec<Signal<T, E>> {
        self.recorded().signals.clone()
    }

    /// Elements received, in order.
    pub fn items(&self) -> Vec<T> {
        self.recorded()
            .signals
            .iter()
            .filter_map(|s| match s {
                Signal::Next(item) => Some(item.clone()),
                _ => None,
            })
            .collect()
    }

    /// The failure received, if any.
    pub fn error(&self) -> Option<E> {
        self.recorded().signals.iter().find_map(|s| match s {
            Signal::Error(error) => Some(error.clone()),
            _ => None,
        })
    }
}

impl<T, E> Clone for RecordingSubscriber<T, E> {
    fn clone(&self) -> Self {
        Self {
            recorded: Arc::clone(&self.recorded),
            initial_request: self.initial_request,
            cancel_after: self.cancel_after,
            inspector: self.inspector.clone(),
        }
    }
}

impl<T, E> Default for RecordingSubscriber<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for RecordingSubscriber<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let recorded = self.recorded();
        f.debug_struct("RecordingSubscriber")
            .field("signals", &recorded.signals.len())
            .field("subscribed", &recorded.subscription.is_some())
            .finish()
    }
}

impl<T, E> Subscriber<T, E> for RecordingSubscriber<T, E> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.recorded().subscription = Some(Arc::clone(&subscription));
        if self.initial_request > 0 {
            subscription.request(self.initial_request);
        }
    }

    fn on_next(&mut self, item: T) {
        if let Some(inspector) = &self.inspector {
            inspector(&item);
        }

        let cancel = {
            let mut recorded = self.recorded();
            recorded.signals.push(Signal::Next(item));
            recorded.received += 1;
            match self.cancel_after {
                Some(n) if recorded.received == n => recorded.subscription.clone(),
                _ => None,
            }
        };

        if let Some(subscription) = cancel {
            subscription.cancel();
        }
    }

    fn on_error(&mut self, error: E) {
        self.recorded().signals.push(Signal::Error(error));
    }

    fn on_complete(&mut self) {
        self.recorded().signals.push(Signal::Complete);
    }
}
