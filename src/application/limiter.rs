//! Send-slot limiter.
//!
//! Wraps a [`RateWindow`] with the synchronization needed to share it between
//! tasks: a mutex around the window and a [`Notify`] that wakes parked waiters
//! whenever expired state is discarded.

use crate::application::ports::Clock;
use crate::domain::window::{RateWindow, Reservation, WindowConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Returned by [`RateLimiter::acquire`] when cancellation fired first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("slot acquisition cancelled")]
pub struct Cancelled;

/// Coordinates send slots for one or more consumers.
///
/// Cloning is cheap; clones share the same window.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

#[derive(Debug)]
struct LimiterInner {
    window: Mutex<RateWindow>,
    released: Notify,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter whose first window opens now.
    pub fn new(config: WindowConfig, clock: Arc<dyn Clock>) -> Self {
        let window = RateWindow::new(config, clock.now());
        Self {
            inner: Arc::new(LimiterInner {
                window: Mutex::new(window),
                released: Notify::new(),
                clock,
            }),
        }
    }

    /// Reserve a slot if one is free right now.
    ///
    /// # Errors
    /// Returns how long until the earliest slot opens.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = self.inner.clock.now();
        let (reservation, freed) = {
            let mut window = self.lock_window();
            let resets = window.resets();
            let reservation = window.try_reserve(now);
            (reservation, window.resets() != resets)
        };

        if freed {
            self.inner.released.notify_waiters();
        }

        match reservation {
            Reservation::Granted => Ok(()),
            Reservation::Wait(remaining) => Err(remaining),
        }
    }

    /// Wait for a slot, then reserve it.
    ///
    /// Never rejects; it only delays. Every wake-up (deadline, a window reset
    /// signalled by another waiter, or a spurious one) goes back through
    /// [`try_acquire`](Self::try_acquire), so a slot is only counted against a
    /// window that still has room.
    ///
    /// Returns the total time spent waiting; zero when a slot was free on
    /// the first check.
    ///
    /// # Errors
    /// Returns `Cancelled` as soon as `cancel` fires; no slot is reserved.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Duration, Cancelled> {
        let started = self.inner.clock.now();
        let mut parked = false;

        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            // Register interest before checking so a reset between the check
            // and the wait still wakes us.
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let remaining = match self.try_acquire() {
                Ok(()) if !parked => return Ok(Duration::ZERO),
                Ok(()) => {
                    return Ok(self.inner.clock.now().saturating_duration_since(started));
                }
                Err(remaining) => remaining,
            };

            tracing::trace!(remaining_ms = remaining.as_millis() as u64, "waiting for send slot");
            parked = true;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = &mut released => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    /// Reservations counted in the current window.
    ///
    /// Reflects the last decision; an expired window is only reset by the
    /// next reservation attempt.
    pub fn reserved(&self) -> u32 {
        self.lock_window().count()
    }

    pub fn config(&self) -> WindowConfig {
        *self.lock_window().config()
    }

    // The window is left consistent after every mutation, so a poisoned lock
    // is still safe to use.
    fn lock_window(&self) -> MutexGuard<'_, RateWindow> {
        self.inner
            .window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
