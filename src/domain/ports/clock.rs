//! Injectable wall-clock time.
//!
//! Every scheduling decision is a function of "now". Services take a
//! [`Clock`] so tests can pin and advance time with [`ManualClock`].

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time in whole minutes since the Unix epoch.
    fn now_minute(&self) -> i64 {
        self.now().timestamp().div_euclid(60)
    }
}

/// Production clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(at)) }
    }

    /// Clock pinned to the start of an epoch minute.
    pub fn at_minute(minute: i64) -> Self {
        Self::new(minute_to_datetime(minute))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn set_minute(&self, minute: i64) {
        self.set(minute_to_datetime(minute));
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Start of the given epoch minute. Out-of-range minutes clamp to the epoch.
pub fn minute_to_datetime(minute: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(minute.saturating_mul(60), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Whole minutes since the Unix epoch, rounded down.
pub fn datetime_to_minute(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::at_minute(1_000);
        let other = clock.clone();
        clock.advance(Duration::minutes(5));
        assert_eq!(other.now_minute(), 1_005);
    }

    #[test]
    fn test_minute_conversion() {
        let at = minute_to_datetime(28_000_000);
        assert_eq!(datetime_to_minute(at), 28_000_000);
        assert_eq!(datetime_to_minute(at + Duration::seconds(59)), 28_000_000);
    }
}
