//! Calendar-day segmentation.
//!
//! A series is processed one whole UTC day at a time, between the first
//! midnight at or after its first sample and the last midnight at or before
//! its last sample. Partial leading and trailing days belong to no window.
//! Each day carries two spans: the overlap span (the day plus a few hours of
//! context on either side) feeds baseline estimation, while the core span
//! receives the day's output. Core spans tile the whole-day body of the
//! series exactly.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::series::Span;

/// One calendar day of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    /// Calendar date of the day start.
    pub date: NaiveDate,
    pub overlap: Span,
    pub core: Span,
}

fn floor_day(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&at.date_naive().and_time(NaiveTime::MIN))
}

fn ceil_day(at: DateTime<Utc>) -> DateTime<Utc> {
    let floored = floor_day(at);
    if floored == at {
        floored
    } else {
        floored + Duration::days(1)
    }
}

/// Splits the series bounds into per-day windows.
///
/// Returns an empty vector when the bounds contain no whole aligned day.
#[must_use]
pub fn day_windows(
    (min, max): (DateTime<Utc>, DateTime<Utc>),
    overlap_hours: i64,
) -> Vec<DayWindow> {
    let first = ceil_day(min);
    let range_days = (floor_day(max) - first).num_days();
    let overlap = Duration::hours(overlap_hours);
    let day = Duration::days(1);
    let clip = |start: DateTime<Utc>, end: DateTime<Utc>| Span {
        start: start.max(min),
        end: end.min(max),
        closed_start: start <= min,
    };
    (0..range_days)
        .map(|offset| {
            let day_start = first + Duration::days(offset);
            DayWindow {
                date: day_start.date_naive(),
                overlap: clip(day_start - overlap, day_start + day + overlap),
                core: clip(day_start, day_start + day),
            }
        })
        .collect()
}
