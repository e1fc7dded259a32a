//! # Clock
//!
//! The engine's single source of time. Deadlines are advisory and checked
//! against the injected clock, so tests drive time explicitly with
//! [`ManualClock`] instead of sleeping.

use parking_lot::Mutex;

use escrow_core::Timestamp;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// The current time (UTC).
    fn now(&self) -> Timestamp;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A settable clock for tests.
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Move the clock to an absolute time.
    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    /// Advance the clock by whole days.
    pub fn advance_days(&self, days: i64) {
        let mut now = self.now.lock();
        *now = now.plus_days(days);
    }

    /// Advance the clock by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now = now.plus_secs(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_deterministically() {
        let clock = ManualClock::new(Timestamp::parse("2026-01-01T00:00:00Z").unwrap());
        assert_eq!(clock.now().to_iso8601(), "2026-01-01T00:00:00Z");
        clock.advance_days(14);
        assert_eq!(clock.now().to_iso8601(), "2026-01-15T00:00:00Z");
        clock.advance_secs(30);
        assert_eq!(clock.now().to_iso8601(), "2026-01-15T00:00:30Z");
        clock.set(Timestamp::parse("2027-01-01T00:00:00Z").unwrap());
        assert_eq!(clock.now().to_iso8601(), "2027-01-01T00:00:00Z");
    }
}
