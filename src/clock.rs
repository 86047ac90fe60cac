//! Time sources.
//!
//! Limiters measure windows on the monotonic clock; ban expiry is compared
//! against wall-clock time because ban records carry calendar timestamps.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of "now" for the limiters and the ban gate.
pub trait Clock: Send + Sync + Debug {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Current wall-clock time.
    fn wall_now(&self) -> DateTime<Utc>;
}

/// System clock backed by `Instant::now()` and `Utc::now()`.
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

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to the pipeline
/// and advance another. Monotonic and wall time advance together.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<(Instant, DateTime<Utc>)>>,
}

impl ManualClock {
    /// Start at the current system time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Start at a specific wall-clock time.
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new((Instant::now(), wall))),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.0 += duration;
        // Durations beyond chrono's range leave wall time where it is.
        if let Ok(delta) = chrono::Duration::from_std(duration) {
            state.1 += delta;
        }
    }

    /// Move time forward by a number of milliseconds.
    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().0
    }

    fn wall_now(&self) -> DateTime<Utc> {
        self.state.lock().1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now() > t1);
    }

    #[test]
    fn test_manual_clock_advances_both_times() {
        let clock = ManualClock::new();
        let (mono, wall) = (clock.now(), clock.wall_now());

        clock.advance_ms(1500);

        assert_eq!(clock.now() - mono, Duration::from_millis(1500));
        assert_eq!(clock.wall_now() - wall, chrono::Duration::milliseconds(1500));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let start = clock.now();

        other.advance(Duration::from_secs(10));

        assert_eq!(clock.now(), start + Duration::from_secs(10));
    }

    #[test]
    fn test_manual_clock_is_frozen_without_advance() {
        let clock = ManualClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(clock.now(), t1);
    }
}
