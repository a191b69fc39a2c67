//! Time windows used for fetching source data and searching calendars.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// A closed window of UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeWindow { start, end }
    }

    /// Window covering the last `days` days in `tz`: from local midnight `days` days
    /// before `now` until the last millisecond of today.
    pub fn for_last_days(days: i64, tz: Tz, now: DateTime<Utc>) -> Self {
        let today = now.with_timezone(&tz).date_naive();
        let first_day = today - Duration::days(days);

        TimeWindow {
            start: start_of_day(first_day, tz),
            end: start_of_day(today + Duration::days(1), tz) - Duration::milliseconds(1),
        }
    }

    /// Window spanning one whole local calendar day.
    pub fn for_day(date: NaiveDate, tz: Tz) -> Self {
        TimeWindow {
            start: start_of_day(date, tz),
            end: start_of_day(date + Duration::days(1), tz),
        }
    }

    /// Expand the window by `buffer` on both ends.
    pub fn widen(&self, buffer: Duration) -> Self {
        TimeWindow {
            start: self.start - buffer,
            end: self.end + buffer,
        }
    }

    /// Whether `[start, end)` overlaps this window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }
}

/// First instant of `date` in `tz`.
///
/// When midnight does not exist locally (DST gap) the earliest valid
/// interpretation is used, falling back to UTC midnight.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}
