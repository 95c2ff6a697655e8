//! Time source used by services and the recurrence generator.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// The current UTC instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut guard = self.now.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = guard.checked_add_signed(delta) {
            *guard = next;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_advance() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single();
        assert!(start.is_some());
        if let Some(start) = start {
            let clock = FixedClock::new(start);
            clock.advance(TimeDelta::hours(2));
            assert_eq!(clock.now(), start + TimeDelta::hours(2));
        }
    }
}
