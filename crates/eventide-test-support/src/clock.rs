//! Deterministic `Clock` for tests.

use chrono::{DateTime, TimeZone, Utc};
use eventide_core::clock::Clock;

/// A clock frozen at one instant. Event IDs generated through it all carry
/// the same embedded timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// A clock frozen at midnight UTC on the given date.
    ///
    /// # Panics
    ///
    /// Panics if the date does not exist.
    #[must_use]
    pub fn on(year: i32, month: u32, day: u32) -> Self {
        Self(
            Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
                .single()
                .expect("FixedClock::on requires a valid calendar date"),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
