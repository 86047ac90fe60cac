//! Fixed-window counter.

use std::time::{Duration, Instant};

use super::rules::{Decision, LimitRule};

/// Call count for one key within the current fixed window.
///
/// The count only grows while `now < reset_at`. At or after `reset_at` the
/// window is replaced rather than incremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    count: u32,
    reset_at: Instant,
}

impl WindowCounter {
    /// Open a window at `now` that already holds the call that opened it.
    pub fn start(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
        }
    }

    /// Whether the window has run out. `reset_at` itself counts as expired.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }

    /// Record a call at `now` against `rule`.
    pub fn observe(&mut self, now: Instant, rule: &LimitRule) -> Decision {
        if self.is_expired(now) {
            *self = Self::start(now, rule.window());
            return Decision::allow();
        }

        if self.count >= rule.max_requests {
            return Decision::reject(self.duration_until_reset(now));
        }

        self.count += 1;
        Decision::allow()
    }

    /// Calls counted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Time left until the window resets.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}
