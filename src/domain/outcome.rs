//! Outcomes reported to an admission-control policy.
//!
//! Every element or error that passes through a rate-limited subscription is
//! settled with the policy as an [`Outcome`]. The gateway never inspects the
//! payload; it only chooses the variant.

/// Which branch of behavior an outcome represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// An element was delivered
    Success,
    /// The stream failed
    Failure,
}

/// Result of a single signal, as seen by an admission-control policy.
///
/// # Example
/// ```
/// use stream_throttle::{Outcome, OutcomeKind};
///
/// let ok: Outcome<u32, String> = Outcome::Success(7);
/// assert!(ok.is_success());
/// assert_eq!(ok.kind(), OutcomeKind::Success);
///
/// let failed: Outcome<u32, String> = Outcome::Failure("boom".to_string());
/// assert_eq!(failed.as_ref().failure(), Some(&"boom".to_string()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome<T, E> {
    /// An element was delivered
    Success(T),
    /// The stream failed with an error
    Failure(E),
}

impl<T, E> Outcome<T, E> {
    /// Get the variant of this outcome.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::Failure(_) => OutcomeKind::Failure,
        }
    }

    /// Check if this outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Check if this outcome is a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Borrow the payload without consuming the outcome.
    pub fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Outcome::Success(value) => Outcome::Success(value),
            Outcome::Failure(error) => Outcome::Failure(error),
        }
    }

    /// Map the success payload.
    pub fn map<U, F>(self, f: F) -> Outcome<U, E>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(error) => Outcome::Failure(error),
        }
    }

    /// Map the failure payload.
    pub fn map_failure<F2, F>(self, f: F) -> Outcome<T, F2>
    where
        F: FnOnce(E) -> F2,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(value),
            Outcome::Failure(error) => Outcome::Failure(f(error)),
        }
    }

    /// Take the success payload, if any.
    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    /// Take the failure payload, if any.
    pub fn failure(self) -> Option<E> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(error) => Some(error),
        }
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(error) => Err(error),
        }
    }
}

impl<T: Clone, E: Clone> Outcome<&T, &E> {
    /// Clone a borrowed outcome into an owned one.
    pub fn cloned(self) -> Outcome<T, E> {
        match self {
            Outcome::Success(value) => Outcome::Success(value.clone()),
            Outcome::Failure(error) => Outcome::Failure(error.clone()),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Failure(error),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        outcome.into_result()
    }
}
