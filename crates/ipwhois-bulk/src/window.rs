//! Per-registry request windows

use std::time::{Duration, Instant};

/// Requests allowed per registry within one window
pub const WINDOW_LIMIT: u32 = 9;

/// A counter plus the instant its window opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    started: Instant,
    count: u32,
}

impl RateWindow {
    pub fn new(now: Instant) -> Self {
        Self { started: now, count: 0 }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn expired(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started) >= length
    }

    /// Full and still open
    pub fn exhausted(&self, now: Instant, length: Duration) -> bool {
        self.count >= WINDOW_LIMIT && !self.expired(now, length)
    }

    /// Time until the window expires
    pub fn remaining(&self, now: Instant, length: Duration) -> Duration {
        length.saturating_sub(now.saturating_duration_since(self.started))
    }

    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }

    /// Count one request; true when that filled the window
    pub fn record(&mut self) -> bool {
        self.count += 1;
        self.count >= WINDOW_LIMIT
    }

    /// Close the window from `now` after the server rate limited us
    pub fn saturate(&mut self, now: Instant) {
        self.started = now;
        self.count = WINDOW_LIMIT;
    }
}
