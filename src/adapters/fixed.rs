//! Clock pinned to a single instant.

use chrono::{DateTime, NaiveDate, Utc};

use crate::ports::clock::Clock;

/// Clock that always reports the same instant.
///
/// Used when `LINEAGE_TODAY` pins the evaluation date and in tests.
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Pins the clock at midnight UTC of `date`.
    #[must_use]
    pub fn on(date: NaiveDate) -> Self {
        Self(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
