//! Clock port for obtaining the current time.

use chrono::{DateTime, NaiveDate, Utc};

/// Provides the current time.
///
/// Override expiry is decided against [`Clock::today`], so tests and
/// reproducible CI runs substitute a fixed clock.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current UTC date.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
