//! Send-window accounting.
//!
//! A [`RateWindow`] decides, for a given instant, whether one more send may be
//! reserved. It is pure state: no locking and no sleeping happen here. The
//! [`RateLimiter`](crate::application::limiter::RateLimiter) wraps it with
//! synchronization and the wait loop.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error returned when limiter or routing configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The request limit must allow at least one send per window
    #[error("request limit must be greater than 0")]
    ZeroLimit,
    /// The window duration must be non-zero
    #[error("window duration must be greater than 0")]
    ZeroDuration,
    /// A route points at an unusable destination
    #[error("invalid destination for {variant}: {reason}")]
    InvalidDestination {
        /// Variant tag the route was registered for
        variant: String,
        /// Why the destination was rejected
        reason: &'static str,
    },
}

/// Unit of time used to express "N requests per unit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Length of one unit.
    pub fn duration(self) -> Duration {
        match self {
            TimeUnit::Millisecond => Duration::from_millis(1),
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(60 * 60),
            TimeUnit::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// How reservations are counted against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMode {
    /// Counter over a window that restarts lazily at the first reservation
    /// attempted after it expired.
    #[default]
    Fixed,
    /// Log of the last `limit` reservation instants; a slot frees up exactly
    /// `duration` after the reservation that took it.
    Sliding,
}

/// Validated limiter parameters.
///
/// # Example
/// ```
/// use submission_throttle::{TimeUnit, WindowConfig};
/// use std::time::Duration;
///
/// let config = WindowConfig::per(TimeUnit::Second, 10).unwrap();
/// assert_eq!(config.limit(), 10);
/// assert_eq!(config.duration(), Duration::from_secs(1));
///
/// assert!(WindowConfig::fixed(0, Duration::from_secs(1)).is_err());
/// assert!(WindowConfig::fixed(5, Duration::ZERO).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    limit: u32,
    duration: Duration,
    mode: WindowMode,
}

impl WindowConfig {
    /// Fixed window allowing `limit` sends per `duration`.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroLimit` or `ConfigError::ZeroDuration`.
    pub fn fixed(limit: u32, duration: Duration) -> Result<Self, ConfigError> {
        Self::with_mode(limit, duration, WindowMode::Fixed)
    }

    /// Sliding window allowing `limit` sends in any span of `duration`.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroLimit` or `ConfigError::ZeroDuration`.
    pub fn sliding(limit: u32, duration: Duration) -> Result<Self, ConfigError> {
        Self::with_mode(limit, duration, WindowMode::Sliding)
    }

    /// Fixed window of one `unit` allowing `limit` sends.
    pub fn per(unit: TimeUnit, limit: u32) -> Result<Self, ConfigError> {
        Self::fixed(limit, unit.duration())
    }

    fn with_mode(limit: u32, duration: Duration, mode: WindowMode) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(Self {
            limit,
            duration,
            mode,
        })
    }

    /// Maximum sends per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of one window.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// How reservations are counted against the window.
    pub fn mode(&self) -> WindowMode {
        self.mode
    }
}

/// History slots reserved up front in sliding mode; larger limits grow on demand.
const MAX_PREALLOCATED_HISTORY: usize = 1024;

/// Result of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A slot was taken in the current window
    Granted,
    /// No slot is free; the earliest one opens after this long
    Wait(Duration),
}

impl Reservation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Reservation::Granted)
    }
}

/// Mutable window state.
///
/// # Example
/// ```
/// use submission_throttle::{RateWindow, Reservation, WindowConfig};
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let config = WindowConfig::fixed(2, Duration::from_secs(1)).unwrap();
/// let mut window = RateWindow::new(config, start);
///
/// assert!(window.try_reserve(start).is_granted());
/// assert!(window.try_reserve(start).is_granted());
/// assert_eq!(
///     window.try_reserve(start + Duration::from_millis(400)),
///     Reservation::Wait(Duration::from_millis(600))
/// );
///
/// // Window expired: reset, then count the new reservation
/// assert!(window.try_reserve(start + Duration::from_secs(1)).is_granted());
/// assert_eq!(window.count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RateWindow {
    config: WindowConfig,
    window_start: Instant,
    count: u32,
    resets: u64,
    // Sliding mode only: start instants of the reservations still inside the window
    history: VecDeque<Instant>,
}

impl RateWindow {
    /// Create a window that opens at `now`.
    pub fn new(config: WindowConfig, now: Instant) -> Self {
        let history = match config.mode {
            WindowMode::Fixed => VecDeque::new(),
            WindowMode::Sliding => {
                VecDeque::with_capacity((config.limit as usize).min(MAX_PREALLOCATED_HISTORY))
            }
        };
        Self {
            config,
            window_start: now,
            count: 0,
            resets: 0,
            history,
        }
    }

    /// Try to take one slot at `now`.
    ///
    /// Expired state is discarded before the decision is made, so the result
    /// only ever reflects reservations inside the current window.
    pub fn try_reserve(&mut self, now: Instant) -> Reservation {
        match self.config.mode {
            WindowMode::Fixed => self.try_reserve_fixed(now),
            WindowMode::Sliding => self.try_reserve_sliding(now),
        }
    }

    fn try_reserve_fixed(&mut self, now: Instant) -> Reservation {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.config.duration {
            self.reset(now);
        }

        if self.count < self.config.limit {
            self.count += 1;
            return Reservation::Granted;
        }

        // elapsed < duration here: a reset above would have freed a slot
        Reservation::Wait(self.config.duration - elapsed)
    }

    fn try_reserve_sliding(&mut self, now: Instant) -> Reservation {
        let before = self.history.len();
        while let Some(&oldest) = self.history.front() {
            if now.saturating_duration_since(oldest) >= self.config.duration {
                self.history.pop_front();
            } else {
                break;
            }
        }
        if self.history.len() < before {
            self.resets += 1;
        }
        self.window_start = self.history.front().copied().unwrap_or(now);

        if self.history.len() < self.config.limit as usize {
            self.history.push_back(now);
            self.count = self.history.len() as u32;
            return Reservation::Granted;
        }

        self.count = self.history.len() as u32;
        let elapsed = now.saturating_duration_since(self.window_start);
        Reservation::Wait(self.config.duration.saturating_sub(elapsed))
    }

    fn reset(&mut self, now: Instant) {
        self.count = 0;
        self.window_start = now;
        self.resets += 1;
    }

    /// Reservations counted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Start of the current window (oldest live reservation in sliding mode).
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// How many times expired state has been discarded.
    ///
    /// Waiters use a change in this value as a hint that capacity was freed.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(limit: u32, millis: u64) -> WindowConfig {
        WindowConfig::fixed(limit, Duration::from_millis(millis)).unwrap()
    }

    #[test]
    fn test_config_rejects_zero_limit() {
        assert_eq!(
            WindowConfig::fixed(0, Duration::from_secs(1)),
            Err(ConfigError::ZeroLimit)
        );
        assert_eq!(
            WindowConfig::sliding(0, Duration::from_secs(1)),
            Err(ConfigError::ZeroLimit)
        );
    }

    #[test]
    fn test_sliding_window_with_huge_limit() {
        let now = Instant::now();
        let config = WindowConfig::sliding(u32::MAX, Duration::from_secs(1)).unwrap();
        let mut window = RateWindow::new(config, now);

        assert!(window.try_reserve(now).is_granted());
        assert_eq!(window.count(), 1);
        assert!(window.history.capacity() <= 2 * MAX_PREALLOCATED_HISTORY);
    }

    #[test]
    fn test_boundary_burst_fixed_versus_sliding() {
        let start = Instant::now();
        let just_before = start + Duration::from_millis(999);
        let just_after = start + Duration::from_millis(1000);

        // Fixed: 2 at the end of one window, 2 at the start of the next
        let mut fixed_window = RateWindow::new(fixed(2, 1000), start);
        assert!(fixed_window.try_reserve(start).is_granted());
        assert!(fixed_window.try_reserve(just_before).is_granted());
        assert!(fixed_window.try_reserve(just_after).is_granted());
        assert!(fixed_window.try_reserve(just_after).is_granted());

        // Sliding: the reservation at 999ms still counts at 1000ms
        let config = WindowConfig::sliding(2, Duration::from_millis(1000)).unwrap();
        let mut sliding_window = RateWindow::new(config, start);
        assert!(sliding_window.try_reserve(start).is_granted());
        assert!(sliding_window.try_reserve(just_before).is_granted());
        assert!(sliding_window.try_reserve(just_after).is_granted());
        assert_eq!(
            sliding_window.try_reserve(just_after),
            Reservation::Wait(Duration::from_millis(999))
        );
    }

    #[test]
    fn test_sliding_history_grows_past_preallocation() {
        let now = Instant::now();
        let limit = MAX_PREALLOCATED_HISTORY as u32 + 10;
        let mut window = RateWindow::new(WindowConfig::sliding(limit, Duration::from_secs(60)).unwrap(), now);

        for _ in 0..limit {
            assert!(window.try_reserve(now).is_granted());
        }
        assert!(!window.try_reserve(now).is_granted());
        assert_eq!(window.count(), limit);
    }

    #[test]
    fn test_config_rejects_zero_duration() {
        assert_eq!(
            WindowConfig::fixed(3, Duration::ZERO),
            Err(ConfigError::ZeroDuration)
        );
    }

    #[test]
    fn test_config_per_time_unit() {
        let config = WindowConfig::per(TimeUnit::Minute, 100).unwrap();
        assert_eq!(config.duration(), Duration::from_secs(60));
        assert_eq!(config.limit(), 100);
        assert_eq!(config.mode(), WindowMode::Fixed);
    }

    #[test]
    fn test_fixed_window_grants_up_to_limit() {
        let now = Instant::now();
        let mut window = RateWindow::new(fixed(3, 1000), now);

        for _ in 0..3 {
            assert_eq!(window.try_reserve(now), Reservation::Granted);
        }
        assert_eq!(
            window.try_reserve(now),
            Reservation::Wait(Duration::from_secs(1))
        );
        assert_eq!(window.count(), 3);
    }

    #[test]
    fn test_fixed_window_wait_shrinks_with_elapsed_time() {
        let now = Instant::now();
        let mut window = RateWindow::new(fixed(1, 1000), now);

        assert!(window.try_reserve(now).is_granted());
        assert_eq!(
            window.try_reserve(now + Duration::from_millis(250)),
            Reservation::Wait(Duration::from_millis(750))
        );
        assert_eq!(
            window.try_reserve(now + Duration::from_millis(999)),
            Reservation::Wait(Duration::from_millis(1))
        );
    }

    #[test]
    fn test_fixed_window_resets_at_boundary() {
        let now = Instant::now();
        let mut window = RateWindow::new(fixed(2, 100), now);

        assert!(window.try_reserve(now).is_granted());
        assert!(window.try_reserve(now).is_granted());

        // elapsed == duration counts as expired
        let boundary = now + Duration::from_millis(100);
        assert!(window.try_reserve(boundary).is_granted());
        assert_eq!(window.count(), 1);
        assert_eq!(window.window_start(), boundary);
        assert_eq!(window.resets(), 1);
    }

    #[test]
    fn test_expired_window_reset_leaves_only_own_reservation() {
        let now = Instant::now();
        let mut window = RateWindow::new(fixed(5, 100), now);

        for _ in 0..5 {
            window.try_reserve(now);
        }

        // Each acquisition after a full expiry starts a fresh window
        for step in 1..=4u64 {
            let later = now + Duration::from_millis(150 * step);
            assert!(window.try_reserve(later).is_granted());
            assert_eq!(window.count(), 1);
        }
    }

    #[test]
    fn test_fixed_window_never_counts_past_limit() {
        let now = Instant::now();
        let mut window = RateWindow::new(fixed(4, 1000), now);

        let granted = (0..100)
            .map(|i| window.try_reserve(now + Duration::from_millis(i)))
            .filter(Reservation::is_granted)
            .count();

        assert_eq!(granted, 4);
        assert_eq!(window.count(), 4);
    }

    #[test]
    fn test_clock_moving_backwards_does_not_reset() {
        let now = Instant::now() + Duration::from_secs(10);
        let mut window = RateWindow::new(fixed(1, 1000), now);

        assert!(window.try_reserve(now).is_granted());
        let earlier = now - Duration::from_secs(5);
        assert_eq!(
            window.try_reserve(earlier),
            Reservation::Wait(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_sliding_window_frees_slot_per_reservation() {
        let now = Instant::now();
        let config = WindowConfig::sliding(2, Duration::from_millis(100)).unwrap();
        let mut window = RateWindow::new(config, now);

        assert!(window.try_reserve(now).is_granted());
        assert!(window
            .try_reserve(now + Duration::from_millis(90))
            .is_granted());

        // Fixed mode would reset at 100ms and allow two more; sliding frees one
        let at = now + Duration::from_millis(100);
        assert!(window.try_reserve(at).is_granted());
        assert_eq!(
            window.try_reserve(at),
            Reservation::Wait(Duration::from_millis(90))
        );
    }

    #[test]
    fn test_sliding_window_bounds_any_interval() {
        let now = Instant::now();
        let config = WindowConfig::sliding(3, Duration::from_millis(100)).unwrap();
        let mut window = RateWindow::new(config, now);

        let granted: Vec<Instant> = (0..500u64)
            .map(|i| now + Duration::from_millis(i))
            .filter(|t| window.try_reserve(*t).is_granted())
            .collect();

        for pair in granted.windows(4) {
            assert!(pair[3].duration_since(pair[0]) >= Duration::from_millis(100));
        }
    }
}
