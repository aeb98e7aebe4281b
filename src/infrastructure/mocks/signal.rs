//! Signals observed on a subscription.

use crate::domain::outcome::Outcome;

/// A single signal delivered to a subscriber.
///
/// Used to record what a subscriber saw, in order, so that the streaming
/// protocol's rules can be checked after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<T, E> {
    /// An element
    Next(T),
    /// Terminal failure
    Error(E),
    /// Terminal completion
    Complete,
}

impl<T, E> Signal<T, E> {
    /// Check if this signal ends the subscription.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Signal::Error(_) | Signal::Complete)
    }

    /// The outcome this signal settles, if any.
    ///
    /// Completion carries no outcome.
    pub fn outcome(&self) -> Option<Outcome<&T, &E>> {
        match self {
            Signal::Next(value) => Some(Outcome::Success(value)),
            Signal::Error(error) => Some(Outcome::Failure(error)),
            Signal::Complete => None,
        }
    }
}
