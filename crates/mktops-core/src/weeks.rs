//! Week-range helpers.
//!
//! Weekly aggregates are keyed by explicit `[start, end]` rows in the
//! `weeks` table rather than a calendar function; these helpers only decide
//! which ranges a rollup run should materialize. Weeks run Monday–Sunday.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// An inclusive Monday–Sunday date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// The week containing `date`.
#[must_use]
pub fn week_containing(date: NaiveDate) -> WeekRange {
    let days_from_monday = i64::from(date.weekday().num_days_from_monday());
    let start = date - Duration::days(days_from_monday);
    WeekRange {
        start,
        end: start + Duration::days(6),
    }
}

/// Every week overlapping the inclusive `[from, to]` interval, in order.
#[must_use]
pub fn weeks_covering(from: NaiveDate, to: NaiveDate) -> Vec<WeekRange> {
    if from > to {
        return Vec::new();
    }
    let mut weeks = Vec::new();
    let mut cursor = week_containing(from);
    while cursor.start <= to {
        weeks.push(cursor);
        cursor = week_containing(cursor.end + Duration::days(1));
    }
    weeks
}

/// Whether `date` falls on a Monday (sanity check for stored week rows).
#[must_use]
pub fn is_week_start(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Mon
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn week_containing_aligns_to_monday() {
        // 2026-08-15 is a Saturday.
        let week = week_containing(d(2026, 8, 15));
        assert_eq!(week.start, d(2026, 8, 10));
        assert_eq!(week.end, d(2026, 8, 16));
        assert!(is_week_start(week.start));
    }

    #[test]
    fn monday_is_its_own_week_start() {
        let week = week_containing(d(2026, 8, 10));
        assert_eq!(week.start, d(2026, 8, 10));
    }

    #[test]
    fn weeks_covering_spans_boundaries() {
        let weeks = weeks_covering(d(2026, 8, 15), d(2026, 8, 25));
        assert_eq!(weeks.len(), 3);
        assert_eq!(weeks[0].start, d(2026, 8, 10));
        assert_eq!(weeks[2].end, d(2026, 8, 30));
    }

    #[test]
    fn weeks_covering_empty_on_inverted_range() {
        assert!(weeks_covering(d(2026, 8, 20), d(2026, 8, 10)).is_empty());
    }
}
