//! Hand-driven clock.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// [`Clock`] that only moves when a test moves it.
///
/// Window decisions and enqueue timestamps read this clock, so a test can
/// expire a window by calling [`advance`](Self::advance) instead of
/// sleeping. The limiter still parks on the tokio timer, though: a waiter
/// sleeping on a mock clock wakes when its timer fires or when another
/// reservation observes the advanced time and resets the window.
///
/// Clones share one instant.
///
/// # Examples
///
/// ```
/// use submission_throttle::infrastructure::mocks::MockClock;
/// use submission_throttle::{Clock, RateWindow, WindowConfig};
/// use std::time::{Duration, Instant};
///
/// let clock = MockClock::new(Instant::now());
/// let config = WindowConfig::fixed(1, Duration::from_secs(60)).unwrap();
/// let mut window = RateWindow::new(config, clock.now());
///
/// assert!(window.try_reserve(clock.now()).is_granted());
/// assert!(!window.try_reserve(clock.now()).is_granted());
///
/// // A minute passes instantly
/// clock.advance(Duration::from_secs(60));
/// assert!(window.try_reserve(clock.now()).is_granted());
/// assert_eq!(clock.elapsed(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    state: Arc<Mutex<MockTime>>,
}

#[derive(Debug)]
struct MockTime {
    origin: Instant,
    current: Instant,
}

impl MockClock {
    /// Clock reading `start` until moved.
    pub fn new(start: Instant) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockTime {
                origin: start,
                current: start,
            })),
        }
    }

    /// Move every clone forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.lock().current += duration;
    }

    /// Jump to `instant`. Moving before the current time is allowed; window
    /// code saturates negative spans to zero.
    pub fn set(&self, instant: Instant) {
        self.lock().current = instant;
    }

    /// Time advanced since the clock was created.
    pub fn elapsed(&self) -> Duration {
        let time = self.lock();
        time.current.saturating_duration_since(time.origin)
    }

    fn lock(&self) -> MutexGuard<'_, MockTime> {
        self.state
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.lock().current
    }
}
