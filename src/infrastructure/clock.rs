//! Clock adapters for time operations.
//!
//! Permit windows are measured against a monotonic clock, so the production
//! adapter reads `Instant::now()`. See `MockClock` (in
//! `crate::infrastructure::mocks`) for a controllable test clock.

use crate::application::ports::Clock;
use std::time::Instant;

/// System clock implementation using `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
