//! Wall clock.

use chrono::{DateTime, Utc};

use crate::ports::clock::Clock;

/// Reads the system clock in UTC.
///
/// Override expiry compares against the UTC date, so a run just after local
/// midnight may still see yesterday.
pub struct LiveClock;

impl Clock for LiveClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
