//! Per-surface auto-sync timer.
//!
//! Timers are polled from the main loop's tick rather than running on their
//! own thread, so a timer that has been dropped can never fire.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct AutoSyncTimer {
    interval: Duration,
    next_fire: Instant,
}

impl AutoSyncTimer {
    /// Start a timer that first fires one `interval` after `now`.
    ///
    /// Returns `None` for a zero interval, which disables auto-sync.
    pub fn start(interval: Duration, now: Instant) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }
        Some(Self {
            interval,
            next_fire: now + interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_fire
    }

    /// Schedule the next firing one interval after `now`.
    pub fn reschedule(&mut self, now: Instant) {
        self.next_fire = now + self.interval;
    }
}
