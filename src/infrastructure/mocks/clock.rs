//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock that only moves when a test moves it.
///
/// Time is kept as an offset from a fixed origin, so permit windows can be
/// stepped across cycle boundaries exactly. Clones share the same offset.
///
/// # Examples
///
/// ```
/// use stream_throttle::infrastructure::mocks::MockClock;
/// use stream_throttle::application::ports::Clock;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
/// assert_eq!(clock.now(), start);
///
/// clock.advance(Duration::from_millis(500));
/// assert_eq!(clock.elapsed(), Duration::from_millis(500));
/// assert_eq!(clock.now(), start + Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    origin: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a mock clock starting at a specific instant.
    pub fn new(start: Instant) -> Self {
        Self {
            origin: start,
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Set the clock to a specific instant.
    ///
    /// Instants before the origin clamp to the origin.
    pub fn set(&self, instant: Instant) {
        let nanos = instant.saturating_duration_since(self.origin).as_nanos();
        self.offset_nanos
            .store(u64::try_from(nanos).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    /// Time elapsed since the origin.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}
