//! Recording admission policy for testing.

use crate::application::ports::AdmissionPolicy;
use crate::domain::outcome::Outcome;
use std::sync::Mutex;

/// Policy that records every settled outcome, in order.
#[derive(Debug)]
pub struct RecordingPolicy<T, E> {
    settlements: Mutex<Vec<Outcome<T, E>>>,
}

impl<T: Clone, E: Clone> RecordingPolicy<T, E> {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self {
            settlements: Mutex::new(Vec::new()),
        }
    }

    /// Every outcome settled so far.
    pub fn settlements(&self) -> Vec<Outcome<T, E>> {
        self.settlements
            .lock()
            .expect("RecordingPolicy mutex poisoned")
            .clone()
    }

    /// Elements settled as successes.
    pub fn successes(&self) -> Vec<T> {
        self.settlements()
            .into_iter()
            .filter_map(Outcome::success)
            .collect()
    }

    /// Failures settled.
    pub fn failures(&self) -> Vec<E> {
        self.settlements()
            .into_iter()
            .filter_map(Outcome::failure)
            .collect()
    }

    /// Number of settlements.
    pub fn count(&self) -> usize {
        self.settlements
            .lock()
            .expect("RecordingPolicy mutex poisoned")
            .len()
    }
}

impl<T: Clone, E: Clone> Default for RecordingPolicy<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> AdmissionPolicy<T, E> for RecordingPolicy<T, E>
where
    T: Clone + Send,
    E: Clone + Send,
{
    fn settle_outcome(&self, outcome: Outcome<&T, &E>) {
        self.settlements
            .lock()
            .expect("RecordingPolicy mutex poisoned")
            .push(outcome.cloned());
    }
}
