//! Helpers shared by the crate's unit tests.

use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;

/// Instant used by tests that do not care about the exact time.
pub(crate) const FIXED_MILLIS: i64 = 1_718_000_000_000;

/// Clock frozen at a single instant so backup names are predictable.
pub(crate) struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Returns a shared clock frozen at `millis` since the epoch.
    pub(crate) fn at(millis: i64) -> Arc<dyn Clock> {
        let instant = Utc
            .timestamp_millis_opt(millis)
            .single()
            .expect("valid timestamp");
        Arc::new(Self(instant))
    }
}

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}
