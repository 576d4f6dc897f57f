//! Timezone resolution and half-open time windows.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The host's IANA timezone, falling back to UTC when it can't be resolved.
pub fn local_timezone() -> Tz {
    match iana_time_zone::get_timezone() {
        Ok(name) => name.parse::<Tz>().unwrap_or_else(|e| {
            tracing::warn!("Unknown timezone {:?} ({}), using UTC", name, e);
            Tz::UTC
        }),
        Err(e) => {
            tracing::warn!("Could not resolve local timezone ({}), using UTC", e);
            Tz::UTC
        }
    }
}

/// Start of `date` in `tz`, as a UTC instant.
///
/// Days that skip midnight for DST start at the first valid local time.
pub fn local_midnight(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

/// A half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The Sunday-to-Sunday week in `tz` that contains `instant`.
    pub fn week_containing(instant: DateTime<Utc>, tz: &Tz) -> Self {
        let local_date = instant.with_timezone(tz).date_naive();
        let back = i64::from(local_date.weekday().num_days_from_sunday());
        let week_start = local_date - Duration::days(back);
        let week_end = week_start + Duration::days(7);

        Self {
            start: local_midnight(week_start, tz),
            end: local_midnight(week_end, tz),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
