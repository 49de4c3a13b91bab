//! Timer Clock
//!
//! Timers are scheduled on a wall-clock instant split into whole seconds
//! and milliseconds. The loop reads the time through a [`Clock`] so tests
//! can drive timers without sleeping.
//!
//! ```text
//!   now = (sec: 10, ms: 950)   +   delay 100 ms
//!                │
//!                ▼
//!   (sec: 10, ms: 1050)  ──carry──>  (sec: 11, ms: 50)
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// An instant on the timer clock.
///
/// `ms` is always below 1000. Ordering compares seconds first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct When {
    pub sec: u64,
    pub ms: u64,
}

impl When {
    /// Builds an instant, carrying excess milliseconds into seconds.
    pub fn new(sec: u64, ms: u64) -> Self {
        Self {
            sec: sec.saturating_add(ms / 1000),
            ms: ms % 1000,
        }
    }

    /// Returns the instant `millis` milliseconds later.
    pub fn add_millis(self, millis: u64) -> Self {
        let mut sec = self.sec.saturating_add(millis / 1000);
        let mut ms = self.ms + millis % 1000;
        if ms >= 1000 {
            sec = sec.saturating_add(1);
            ms -= 1000;
        }
        Self { sec, ms }
    }

    /// Milliseconds from `self` until `later` (zero if `later` has passed).
    pub fn millis_until(self, later: When) -> u64 {
        later.as_millis().saturating_sub(self.as_millis())
    }

    /// Returns the instant as milliseconds since the epoch.
    pub fn as_millis(self) -> u64 {
        self.sec.saturating_mul(1000).saturating_add(self.ms)
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.sec, self.ms)
    }
}

/// Source of the current time for an event loop.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> When;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> When {
        // A clock set before 1970 reads as the epoch
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        When::new(elapsed.as_secs(), u64::from(elapsed.subsec_millis()))
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep a handle while the loop
/// owns another.
///
/// # Example
///
/// ```
/// use emberkv::event::{Clock, ManualClock, When};
///
/// let clock = ManualClock::new(When::new(10, 950));
/// let handle = clock.clone();
///
/// handle.advance(100);
/// assert_eq!(clock.now(), When::new(11, 50));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<When>>,
}

impl ManualClock {
    /// Creates a clock stopped at `start`.
    pub fn new(start: When) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Moves the clock forward by `millis` milliseconds.
    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get().add_millis(millis));
    }

    /// Sets the clock to `when`.
    pub fn set(&self, when: When) {
        self.now.set(when);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> When {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_millis_carries() {
        let when = When::new(10, 950).add_millis(100);
        assert_eq!(when, When { sec: 11, ms: 50 });

        let when = When::new(10, 0).add_millis(2500);
        assert_eq!(when, When { sec: 12, ms: 500 });

        // Exactly 1000 ms carries too
        let when = When::new(10, 500).add_millis(500);
        assert_eq!(when, When { sec: 11, ms: 0 });
    }

    #[test]
    fn test_new_normalizes() {
        assert_eq!(When::new(1, 2345), When { sec: 3, ms: 345 });
    }

    #[test]
    fn test_ordering() {
        assert!(When::new(1, 999) < When::new(2, 0));
        assert!(When::new(2, 1) > When::new(2, 0));
    }

    #[test]
    fn test_millis_until() {
        let now = When::new(5, 900);
        assert_eq!(now.millis_until(When::new(6, 100)), 200);
        assert_eq!(now.millis_until(When::new(5, 0)), 0);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a.ms < 1000);
        assert!(a.sec > 0);
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(When::new(0, 0));
        let other = clock.clone();

        other.advance(1500);
        assert_eq!(clock.now(), When::new(1, 500));

        clock.set(When::new(100, 0));
        assert_eq!(other.now(), When::new(100, 0));
    }

    #[test]
    fn test_display() {
        assert_eq!(When::new(3, 7).to_string(), "3.007");
    }
}
