//! Fixed-window permit accounting.
//!
//! Time is split into cycles of `refresh_period`. Each cycle grants
//! `limit_for_period` permits; unused permits do not carry over beyond one
//! full period. A caller may reserve permits from a future cycle when the
//! resulting wait fits inside its timeout, which drives the available count
//! negative until those cycles arrive.
//!
//! All operations take the current instant as an argument so the window stays
//! free of any clock dependency.

use std::time::{Duration, Instant};

/// Result of a permit reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Permits reserved; the caller must wait `wait` before proceeding
    Granted {
        /// Time until the reserved permits become valid
        wait: Duration,
    },
    /// Permits could not be reserved within the timeout
    Rejected {
        /// Time the caller would have needed to wait
        wait: Duration,
    },
}

impl Reservation {
    /// Check if the reservation succeeded.
    pub fn is_granted(&self) -> bool {
        matches!(self, Reservation::Granted { .. })
    }

    /// The computed wait, whether or not the reservation succeeded.
    pub fn wait(&self) -> Duration {
        match self {
            Reservation::Granted { wait } | Reservation::Rejected { wait } => *wait,
        }
    }
}

/// Permit state for a single rate limiter.
///
/// # Example
/// ```
/// use stream_throttle::{PermitWindow, Reservation};
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let mut window = PermitWindow::new(2, Duration::from_secs(1), start);
///
/// assert!(window.reserve(start, 1, Duration::ZERO).is_granted());
/// assert!(window.reserve(start, 1, Duration::ZERO).is_granted());
///
/// // Exhausted for this cycle; no timeout means no borrowing
/// assert!(!window.reserve(start, 1, Duration::ZERO).is_granted());
///
/// // The next cycle refills the window
/// let next = start + Duration::from_secs(1);
/// assert_eq!(window.available_permits(next), 2);
/// ```
#[derive(Debug, Clone)]
pub struct PermitWindow {
    limit_for_period: u32,
    refresh_period: Duration,
    start: Instant,
    active_cycle: u64,
    active_permits: i64,
}

impl PermitWindow {
    /// Create a full window whose first cycle begins at `start`.
    ///
    /// `refresh_period` must be non-zero; `RateLimiterConfig` enforces this.
    pub fn new(limit_for_period: u32, refresh_period: Duration, start: Instant) -> Self {
        Self {
            limit_for_period,
            refresh_period,
            start,
            active_cycle: 0,
            active_permits: i64::from(limit_for_period),
        }
    }

    /// Permits granted per cycle.
    pub fn limit_for_period(&self) -> u32 {
        self.limit_for_period
    }

    /// Length of a cycle.
    pub fn refresh_period(&self) -> Duration {
        self.refresh_period
    }

    /// Change the per-cycle limit.
    ///
    /// Permits already granted in the current cycle are kept; the new limit
    /// applies from the next refresh.
    pub fn set_limit_for_period(&mut self, limit_for_period: u32) {
        self.limit_for_period = limit_for_period;
    }

    /// Permits available at `now` (negative when reserved ahead).
    pub fn available_permits(&self, now: Instant) -> i64 {
        self.refreshed(now).1
    }

    /// Try to reserve `permits`, accepting a wait of at most `timeout`.
    ///
    /// On rejection the window is left unchanged.
    pub fn reserve(&mut self, now: Instant, permits: u32, timeout: Duration) -> Reservation {
        self.refresh(now);

        let wait = self.wait_for(now, permits);
        if wait <= timeout {
            self.active_permits -= i64::from(permits);
            Reservation::Granted { wait }
        } else {
            Reservation::Rejected { wait }
        }
    }

    /// Drop every permit left in the current cycle.
    ///
    /// Permits reserved ahead (a negative balance) stay reserved.
    pub fn drain(&mut self, now: Instant) {
        self.refresh(now);
        self.active_permits = self.active_permits.min(0);
    }

    fn refresh(&mut self, now: Instant) {
        let (cycle, permits) = self.refreshed(now);
        self.active_cycle = cycle;
        self.active_permits = permits;
    }

    fn refreshed(&self, now: Instant) -> (u64, i64) {
        let current_cycle = self.cycle_at(now);
        if current_cycle <= self.active_cycle {
            return (self.active_cycle, self.active_permits);
        }

        let limit = i64::from(self.limit_for_period);
        let elapsed_cycles = i64::try_from(current_cycle - self.active_cycle).unwrap_or(i64::MAX);
        let accumulated = elapsed_cycles.saturating_mul(limit);
        let permits = self.active_permits.saturating_add(accumulated).min(limit);

        (current_cycle, permits)
    }

    fn cycle_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        let period = self.refresh_period.as_nanos().max(1);
        u64::try_from(elapsed / period).unwrap_or(u64::MAX)
    }

    fn wait_for(&self, now: Instant, permits: u32) -> Duration {
        let permits = i64::from(permits);
        if self.active_permits >= permits {
            return Duration::ZERO;
        }

        let period = self.refresh_period.as_nanos().max(1);
        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        let next_cycle_at = u128::from(self.active_cycle + 1) * period;
        let to_next_cycle = next_cycle_at.saturating_sub(elapsed);

        let at_next_cycle = self
            .active_permits
            .saturating_add(i64::from(self.limit_for_period));
        let deficit = permits.saturating_sub(at_next_cycle);
        let full_cycles = if deficit <= 0 {
            0
        } else if self.limit_for_period == 0 {
            return Duration::MAX;
        } else {
            let limit = i64::from(self.limit_for_period);
            (deficit + limit - 1) / limit
        };

        let nanos = (full_cycles as u128)
            .saturating_mul(period)
            .saturating_add(to_next_cycle);
        duration_from_nanos(nanos)
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    match u64::try_from(nanos) {
        Ok(nanos) => Duration::from_nanos(nanos),
        Err(_) => Duration::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(limit: u32, period_ms: u64) -> (PermitWindow, Instant) {
        let start = Instant::now();
        (
            PermitWindow::new(limit, Duration::from_millis(period_ms), start),
            start,
        )
    }

    #[test]
    fn test_grants_up_to_limit() {
        let (mut window, now) = window(3, 1000);

        for _ in 0..3 {
            assert_eq!(
                window.reserve(now, 1, Duration::ZERO),
                Reservation::Granted {
                    wait: Duration::ZERO
                }
            );
        }
        assert!(!window.reserve(now, 1, Duration::ZERO).is_granted());
        assert_eq!(window.available_permits(now), 0);
    }

    #[test]
    fn test_rejection_reports_wait_until_next_cycle() {
        let (mut window, start) = window(1, 1000);
        assert!(window.reserve(start, 1, Duration::ZERO).is_granted());

        let now = start + Duration::from_millis(400);
        let reservation = window.reserve(now, 1, Duration::ZERO);

        assert_eq!(
            reservation,
            Reservation::Rejected {
                wait: Duration::from_millis(600)
            }
        );
        // Rejection leaves state untouched
        assert_eq!(window.available_permits(now), 0);
    }

    #[test]
    fn test_borrowing_from_next_cycle_within_timeout() {
        let (mut window, start) = window(1, 1000);
        assert!(window.reserve(start, 1, Duration::ZERO).is_granted());

        let reservation = window.reserve(start, 1, Duration::from_secs(2));
        assert_eq!(
            reservation,
            Reservation::Granted {
                wait: Duration::from_secs(1)
            }
        );
        assert_eq!(window.available_permits(start), -1);

        // The borrowed permit is consumed by the next cycle's refill
        let next = start + Duration::from_secs(1);
        assert_eq!(window.available_permits(next), 0);
    }

    #[test]
    fn test_large_request_waits_multiple_cycles() {
        let (mut window, start) = window(2, 100);
        assert!(window.reserve(start, 2, Duration::ZERO).is_granted());

        // Need 5: next cycle gives 2, then two more cycles for the remaining 3
        let reservation = window.reserve(start, 5, Duration::from_secs(10));
        assert_eq!(
            reservation,
            Reservation::Granted {
                wait: Duration::from_millis(300)
            }
        );
    }

    #[test]
    fn test_refill_is_capped_at_limit() {
        let (window, start) = window(4, 10);
        let much_later = start + Duration::from_secs(60);
        assert_eq!(window.available_permits(much_later), 4);
    }

    #[test]
    fn test_drain_zeroes_positive_balance() {
        let (mut window, now) = window(5, 1000);
        window.drain(now);
        assert_eq!(window.available_permits(now), 0);
        assert!(!window.reserve(now, 1, Duration::ZERO).is_granted());

        // Next cycle refills as usual
        let next = now + Duration::from_secs(1);
        assert_eq!(window.available_permits(next), 5);
    }

    #[test]
    fn test_drain_keeps_negative_balance() {
        let (mut window, now) = window(1, 1000);
        assert!(window.reserve(now, 2, Duration::from_secs(5)).is_granted());
        assert_eq!(window.available_permits(now), -1);

        window.drain(now);
        assert_eq!(window.available_permits(now), -1);
    }

    #[test]
    fn test_limit_change_applies_on_refresh() {
        let (mut window, start) = window(2, 1000);
        window.set_limit_for_period(10);
        assert_eq!(window.available_permits(start), 2);

        let next = start + Duration::from_secs(1);
        assert_eq!(window.available_permits(next), 10);
    }

    #[test]
    fn test_zero_limit_never_grants() {
        let (mut window, now) = window(0, 1000);
        let reservation = window.reserve(now, 1, Duration::from_secs(3600));
        assert_eq!(reservation, Reservation::Rejected { wait: Duration::MAX });
    }
}
