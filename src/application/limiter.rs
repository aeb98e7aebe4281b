//! Permit-based rate limiter.
//!
//! The reference admission-control policy. Permits are acquired before a
//! subscription starts; outcomes settled by the gateway may drain the rest of
//! the current cycle, depending on the configured `DrainPolicy`.

use crate::application::ports::{AdmissionPolicy, Clock, PermitSource};
use crate::domain::config::{ConfigError, DrainPolicy, RateLimiterConfig};
use crate::domain::outcome::Outcome;
use crate::domain::permits::{PermitWindow, Reservation};
use crate::infrastructure::clock::SystemClock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Rate limiter granting a fixed number of permits per refresh period.
///
/// # Example
/// ```
/// use stream_throttle::{RateLimiter, RateLimiterConfig};
/// use std::time::Duration;
///
/// let config = RateLimiterConfig::builder()
///     .limit_for_period(2)
///     .limit_refresh_period(Duration::from_secs(60))
///     .timeout_duration(Duration::ZERO)
///     .build()
///     .unwrap();
/// let limiter = RateLimiter::new("backend", config).unwrap();
///
/// assert!(limiter.acquire_permission(1));
/// assert!(limiter.acquire_permission(1));
/// assert!(!limiter.acquire_permission(1));
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    window: Mutex<PermitWindow>,
    timeout_nanos: AtomicU64,
    drain_on: DrainPolicy,
    clock: Arc<dyn Clock>,
    waiting: AtomicUsize,
}

impl RateLimiter {
    /// Create a rate limiter using the system clock.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Result<Self, ConfigError> {
        Self::with_clock(name, config, Arc::new(SystemClock::new()))
    }

    /// Create a rate limiter reading time from `clock`.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn with_clock(
        name: impl Into<String>,
        config: RateLimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(name.into(), config, clock))
    }

    /// Build from a configuration that has already passed validation.
    pub(crate) fn from_validated(
        name: String,
        config: RateLimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let window = PermitWindow::new(
            config.limit_for_period,
            config.limit_refresh_period,
            clock.now(),
        );
        Self {
            name,
            window: Mutex::new(window),
            timeout_nanos: AtomicU64::new(duration_to_nanos(config.timeout_duration)),
            drain_on: config.drain_on,
            clock,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Get the limiter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current configuration, including runtime changes.
    pub fn config(&self) -> RateLimiterConfig {
        let window = self.window();
        RateLimiterConfig {
            limit_for_period: window.limit_for_period(),
            limit_refresh_period: window.refresh_period(),
            timeout_duration: self.timeout(),
            drain_on: self.drain_on.clone(),
        }
    }

    /// Reserve permits without blocking.
    ///
    /// Returns the time the caller must wait before the permits are valid, or
    /// `None` if that wait would exceed the configured timeout.
    pub fn reserve_permission(&self, permits: u32) -> Option<Duration> {
        let timeout = self.timeout();
        let reservation = self.window().reserve(self.clock.now(), permits, timeout);

        match reservation {
            Reservation::Granted { wait } => {
                trace!(limiter = %self.name, permits, wait_ms = wait.as_millis() as u64, "permits reserved");
                Some(wait)
            }
            Reservation::Rejected { wait } => {
                debug!(
                    limiter = %self.name,
                    permits,
                    wait_ms = wait.as_millis() as u64,
                    timeout_ms = timeout.as_millis() as u64,
                    "permits rejected"
                );
                None
            }
        }
    }

    /// Acquire permits, blocking the current thread for at most the timeout.
    ///
    /// Returns `false` if the permits could not be acquired in time.
    pub fn acquire_permission(&self, permits: u32) -> bool {
        match self.reserve_permission(permits) {
            Some(wait) if wait.is_zero() => true,
            Some(wait) => {
                self.waiting.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(wait);
                self.waiting.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Acquire permits, waiting asynchronously for at most the timeout.
    ///
    /// Returns `false` if the permits could not be acquired in time.
    #[cfg(feature = "async")]
    pub async fn acquire_permission_async(&self, permits: u32) -> bool {
        match self.reserve_permission(permits) {
            Some(wait) if wait.is_zero() => true,
            Some(wait) => {
                self.waiting.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(wait).await;
                self.waiting.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Drop every permit left in the current cycle.
    pub fn drain_permissions(&self) {
        self.window().drain(self.clock.now());
    }

    /// Permits available right now; negative when reserved ahead.
    pub fn available_permissions(&self) -> i64 {
        self.window().available_permits(self.clock.now())
    }

    /// Number of callers currently sleeping in an acquisition.
    pub fn waiting_callers(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Change the number of permits per cycle, effective from the next cycle.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroLimitForPeriod` if `limit` is zero.
    pub fn change_limit_for_period(&self, limit: u32) -> Result<(), ConfigError> {
        if limit == 0 {
            return Err(ConfigError::ZeroLimitForPeriod);
        }
        self.window().set_limit_for_period(limit);
        debug!(limiter = %self.name, limit, "limit for period changed");
        Ok(())
    }

    /// Change how long callers may wait for permits.
    pub fn change_timeout_duration(&self, timeout: Duration) {
        self.timeout_nanos
            .store(duration_to_nanos(timeout), Ordering::Relaxed);
    }

    fn timeout(&self) -> Duration {
        Duration::from_nanos(self.timeout_nanos.load(Ordering::Relaxed))
    }

    fn window(&self) -> MutexGuard<'_, PermitWindow> {
        // Window updates never leave it half-written, so a poisoned lock is still usable
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    duration.as_nanos().try_into().unwrap_or(u64::MAX)
}

impl<T: 'static, E: 'static> AdmissionPolicy<T, E> for RateLimiter {
    fn settle_outcome(&self, outcome: Outcome<&T, &E>) {
        let kind = outcome.kind();
        if self.drain_on.should_drain_outcome(outcome) {
            debug!(limiter = %self.name, outcome = ?kind, "draining permits");
            self.drain_permissions();
        }
    }
}

impl PermitSource for RateLimiter {
    fn acquire_permission(&self, permits: u32) -> bool {
        RateLimiter::acquire_permission(self, permits)
    }

    fn reserve_permission(&self, permits: u32) -> Option<Duration> {
        RateLimiter::reserve_permission(self, permits)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
