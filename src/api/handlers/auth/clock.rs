//! Single time source for all expiry and lockout math.
//!
//! Every comparison between a stored timestamp and "now" goes through one
//! `TimeSource` so both sides are timezone-aware `DateTime<Utc>` values.
//! Naive timestamps from external callers must pass through
//! [`normalize_naive`] before they are compared with anything.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Clock abstraction consulted for session expiry, code expiry, and
/// lockout windows.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Interpret a naive timestamp as UTC.
///
/// The only sanctioned path from `NaiveDateTime` into the crate; everything
/// past this boundary is `DateTime<Utc>`.
#[must_use]
pub fn normalize_naive(naive: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

#[cfg(test)]
pub(crate) struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl FixedClock {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub(crate) fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = *now + delta;
    }
}

#[cfg(test)]
impl TimeSource for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}
