//! Monotonic time for window decisions and enqueue timestamps.
//!
//! Every instant the crate compares (a record's `enqueued_at`, a window's
//! start, the "now" of a slot reservation) comes from one [`Clock`], so
//! swapping it for `MockClock` (in `crate::infrastructure::mocks`, behind the
//! `test-helpers` feature) makes window arithmetic deterministic in tests.

use crate::application::ports::Clock;
use std::time::Instant;

/// [`Clock`] backed by the operating system's monotonic clock.
///
/// This is what [`SubmissionThrottle`](crate::SubmissionThrottle) uses
/// unless the builder is given another clock. Wall-clock adjustments never
/// move a window backwards or forwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::{RateWindow, WindowConfig};
    use std::time::Duration;

    #[test]
    fn test_never_goes_backwards() {
        let clock = SystemClock::new();
        let mut previous = clock.now();
        for _ in 0..1_000 {
            let now = clock.now();
            assert!(now >= previous);
            previous = now;
        }
    }

    #[test]
    fn test_window_expires_in_real_time() {
        let clock = SystemClock::new();
        let config = WindowConfig::fixed(1, Duration::from_millis(20)).unwrap();
        let mut window = RateWindow::new(config, clock.now());

        assert!(window.try_reserve(clock.now()).is_granted());
        assert!(!window.try_reserve(clock.now()).is_granted());

        std::thread::sleep(Duration::from_millis(25));
        assert!(window.try_reserve(clock.now()).is_granted());
    }
}
