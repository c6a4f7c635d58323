//! Next-fire computation for recurring campaigns

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use tracing::warn;
use wacm_storage::models::Recurrence;

/// Days scanned before giving up. Covers any monthly anchor.
const SEARCH_DAYS: i64 = 400;

/// Wall-clock point a recurring campaign fires at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub hour: u32,
    pub minute: u32,
    pub weekday: Weekday,
    pub day: u32,
}

impl Anchor {
    /// Anchor taken from `at` as seen in `tz`
    pub fn from_instant(at: DateTime<Utc>, tz: Tz) -> Self {
        let local = at.with_timezone(&tz);
        Self {
            hour: local.hour(),
            minute: local.minute(),
            weekday: local.weekday(),
            day: local.day(),
        }
    }

    fn matches_day(&self, recurrence: Recurrence, date: NaiveDate) -> bool {
        match recurrence {
            Recurrence::Daily => true,
            Recurrence::Weekly => date.weekday() == self.weekday,
            Recurrence::Monthly => date.day() == self.day,
            Recurrence::None => false,
        }
    }
}

/// Resolve an IANA name, falling back to `default` and then UTC
pub fn parse_timezone(name: Option<&str>, default: &str) -> Tz {
    let name = name.unwrap_or(default);
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(timezone = name, "Unknown timezone, using UTC");
        Tz::UTC
    })
}

/// First occurrence strictly after `after` and not before `not_before`.
///
/// Local times that do not exist (DST gaps) are skipped; ambiguous ones use
/// the earlier instant. Monthly anchors skip months lacking the day.
pub fn next_occurrence(
    recurrence: Recurrence,
    anchor: &Anchor,
    tz: Tz,
    after: DateTime<Utc>,
    not_before: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    if recurrence == Recurrence::None {
        return None;
    }

    let from = not_before.map_or(after, |nb| nb.max(after));
    let start_date = from.with_timezone(&tz).date_naive();

    (0..SEARCH_DAYS)
        .map(|offset| start_date + Duration::days(offset))
        .filter(|date| anchor.matches_day(recurrence, *date))
        .filter_map(|date| date.and_hms_opt(anchor.hour, anchor.minute, 0))
        .filter_map(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .find(|candidate| *candidate > after && not_before.map_or(true, |nb| *candidate >= nb))
}
