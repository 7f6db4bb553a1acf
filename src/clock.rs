//! Clock abstraction
//!
//! The cache windowing depends on wall-clock time (trading hours vs
//! after-hours). Injecting the clock keeps that behavior deterministic
//! under test.

use chrono::{Local, NaiveDateTime};

/// Source of "now" for time-slot and expiry decisions
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock. Export timestamps are local exchange time, so the
/// cache compares against local time rather than UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Fixed clock for tests and deterministic replay
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_fixed_clock_returns_given_instant() {
        let instant = NaiveDate::from_ymd_opt(2025, 8, 22)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap();
        assert_eq!(FixedClock(instant).now(), instant);
    }
}
