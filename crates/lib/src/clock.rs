//! Time provider abstraction.
//!
//! Last-write-wins tie-breaks compare wall-clock timestamps, so every place
//! that stamps an event or a sync round goes through a [`Clock`]. Production
//! code uses [`SystemClock`]; tests use [`FixedClock`] to get deterministic,
//! strictly increasing timestamps they can also freeze or rewind.

use std::fmt::Debug;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

/// A source of the current time.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests.
///
/// Auto-advances by one millisecond on each `now_utc()` call so consecutive
/// writes get distinct timestamps and LWW tie-breaks stay deterministic. Use
/// [`FixedClock::set_millis`] to jump the clock around a scenario, e.g. to
/// make one node's write deliberately "later" than a concurrent write
/// elsewhere.
pub struct FixedClock {
    millis: Mutex<i64>,
}

impl FixedClock {
    /// Create a clock starting at the given milliseconds since the Unix epoch.
    pub fn new(millis: i64) -> Self {
        Self {
            millis: Mutex::new(millis),
        }
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance(&self, ms: i64) {
        *self.millis.lock().unwrap() += ms;
    }

    /// Set the clock to an absolute value in milliseconds since the epoch.
    pub fn set_millis(&self, ms: i64) {
        *self.millis.lock().unwrap() = ms;
    }

    /// Read the current value without advancing.
    pub fn millis(&self) -> i64 {
        *self.millis.lock().unwrap()
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        let mut millis = self.millis.lock().unwrap();
        let now = *millis;
        *millis += 1;
        Utc.timestamp_millis_opt(now)
            .single()
            .expect("timestamp in range")
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1_704_067_200_000)
    }
}

impl Debug for FixedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedClock")
            .field("millis", &self.millis())
            .finish()
    }
}
