//! Rate limiter configuration.

use crate::domain::outcome::{Outcome, OutcomeKind};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error returned when rate limiter configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `limit_for_period` must be greater than zero
    ZeroLimitForPeriod,
    /// `limit_refresh_period` must be greater than zero
    ZeroRefreshPeriod,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroLimitForPeriod => {
                write!(f, "limit_for_period must be greater than 0")
            }
            ConfigError::ZeroRefreshPeriod => {
                write!(f, "limit_refresh_period must be greater than 0")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Predicate over outcome kinds.
pub type OutcomePredicate = Arc<dyn Fn(OutcomeKind) -> bool + Send + Sync + 'static>;

/// Predicate over settled payloads, type-erased so one configuration can
/// serve limiters shared by streams of different element types.
pub type PayloadPredicate =
    Arc<dyn Fn(Outcome<&dyn Any, &dyn Any>) -> bool + Send + Sync + 'static>;

/// Decides which settled outcomes drain the remaining permits of a cycle.
///
/// Draining lets a limiter back off hard as soon as the downstream reports
/// trouble, instead of waiting for the cycle's permits to run out.
#[derive(Clone, Default)]
pub enum DrainPolicy {
    /// Never drain on settlement
    #[default]
    Never,
    /// Drain when a failure is settled
    OnFailure,
    /// Drain when an element is settled
    OnSuccess,
    /// Drain on every settlement
    Always,
    /// Drain when the predicate returns true
    Custom(OutcomePredicate),
    /// Drain when the predicate over the settled value or error returns true
    CustomOutcome(PayloadPredicate),
}

impl DrainPolicy {
    /// Build a custom drain policy from a predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(OutcomeKind) -> bool + Send + Sync + 'static,
    {
        DrainPolicy::Custom(Arc::new(predicate))
    }

    /// Build a drain policy that inspects the settled element or error.
    ///
    /// Outcomes whose payload is not a `T` (for successes) or an `E` (for
    /// failures) never drain.
    ///
    /// # Example
    /// ```
    /// use stream_throttle::{DrainPolicy, Outcome};
    ///
    /// #[derive(Debug, PartialEq)]
    /// enum ApiError { TooManyRequests, BadRequest }
    ///
    /// let drain_on = DrainPolicy::on_outcome(|outcome: Outcome<&u32, &ApiError>| {
    ///     matches!(outcome, Outcome::Failure(ApiError::TooManyRequests))
    /// });
    ///
    /// let throttled: Outcome<&u32, _> = Outcome::Failure(&ApiError::TooManyRequests);
    /// let bad_request: Outcome<&u32, _> = Outcome::Failure(&ApiError::BadRequest);
    /// assert!(drain_on.should_drain_outcome(throttled));
    /// assert!(!drain_on.should_drain_outcome(bad_request));
    /// ```
    pub fn on_outcome<T, E, F>(predicate: F) -> Self
    where
        T: 'static,
        E: 'static,
        F: Fn(Outcome<&T, &E>) -> bool + Send + Sync + 'static,
    {
        DrainPolicy::CustomOutcome(Arc::new(move |outcome: Outcome<&dyn Any, &dyn Any>| {
            match outcome {
                Outcome::Success(value) => value
                    .downcast_ref::<T>()
                    .is_some_and(|value| predicate(Outcome::Success(value))),
                Outcome::Failure(error) => error
                    .downcast_ref::<E>()
                    .is_some_and(|error| predicate(Outcome::Failure(error))),
            }
        }))
    }

    /// Check whether an outcome of the given kind should drain permits.
    ///
    /// `CustomOutcome` needs the payload and never drains from a kind alone.
    pub fn should_drain(&self, kind: OutcomeKind) -> bool {
        match self {
            DrainPolicy::Never => false,
            DrainPolicy::OnFailure => kind == OutcomeKind::Failure,
            DrainPolicy::OnSuccess => kind == OutcomeKind::Success,
            DrainPolicy::Always => true,
            DrainPolicy::Custom(predicate) => predicate(kind),
            DrainPolicy::CustomOutcome(_) => false,
        }
    }

    /// Check whether a settled outcome should drain permits.
    pub fn should_drain_outcome<T, E>(&self, outcome: Outcome<&T, &E>) -> bool
    where
        T: 'static,
        E: 'static,
    {
        match self {
            DrainPolicy::CustomOutcome(predicate) => predicate(match outcome {
                Outcome::Success(value) => Outcome::Success(value as &dyn Any),
                Outcome::Failure(error) => Outcome::Failure(error as &dyn Any),
            }),
            _ => self.should_drain(outcome.kind()),
        }
    }
}

impl fmt::Debug for DrainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainPolicy::Never => write!(f, "Never"),
            DrainPolicy::OnFailure => write!(f, "OnFailure"),
            DrainPolicy::OnSuccess => write!(f, "OnSuccess"),
            DrainPolicy::Always => write!(f, "Always"),
            DrainPolicy::Custom(_) => write!(f, "Custom(..)"),
            DrainPolicy::CustomOutcome(_) => write!(f, "CustomOutcome(..)"),
        }
    }
}

/// Configuration for a permit-based rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Permits granted per refresh period
    pub limit_for_period: u32,
    /// Length of one refresh period
    pub limit_refresh_period: Duration,
    /// Longest a caller may wait for a permit
    pub timeout_duration: Duration,
    /// Which settled outcomes drain the current cycle
    pub drain_on: DrainPolicy,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit_for_period: 50,
            limit_refresh_period: Duration::from_millis(500),
            timeout_duration: Duration::from_secs(5),
            drain_on: DrainPolicy::Never,
        }
    }
}

impl RateLimiterConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder {
            config: Self::default(),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if the limit or refresh period is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit_for_period == 0 {
            return Err(ConfigError::ZeroLimitForPeriod);
        }
        if self.limit_refresh_period.is_zero() {
            return Err(ConfigError::ZeroRefreshPeriod);
        }
        Ok(())
    }
}

/// Builder for `RateLimiterConfig`.
#[derive(Debug, Clone)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterConfigBuilder {
    /// Set the number of permits per refresh period.
    pub fn limit_for_period(mut self, limit: u32) -> Self {
        self.config.limit_for_period = limit;
        self
    }

    /// Set the refresh period.
    pub fn limit_refresh_period(mut self, period: Duration) -> Self {
        self.config.limit_refresh_period = period;
        self
    }

    /// Set how long a caller may wait for a permit.
    ///
    /// `Duration::ZERO` makes acquisition fail fast.
    pub fn timeout_duration(mut self, timeout: Duration) -> Self {
        self.config.timeout_duration = timeout;
        self
    }

    /// Set which settled outcomes drain the current cycle.
    pub fn drain_on(mut self, drain_on: DrainPolicy) -> Self {
        self.config.drain_on = drain_on;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn build(self) -> Result<RateLimiterConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
