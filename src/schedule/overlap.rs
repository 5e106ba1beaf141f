//! Date-range conflict checks between schedule groups of one fish.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::schedule::group::{GroupKey, ScheduleGroup};
use crate::error::Error;
use crate::types::DayStamp;

const DAY_FORMAT: &str = "%b %d, %Y";
const INPUT_DAY_FORMAT: &str = "%Y-%m-%d";

/// An inclusive `[start, end]` range of day stamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: DayStamp,
    pub end: DayStamp,
}

impl DateRange {
    pub fn new(start: DayStamp, end: DayStamp) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Two ranges overlap when they share at least one day.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        !(self.end < other.start || self.start > other.end)
    }

    pub fn contains(&self, day: DayStamp) -> bool {
        self.start <= day && day <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", format_day(self.start), format_day(self.end))
    }
}

/// Renders a day stamp as `MMM dd, yyyy` in UTC.
pub fn format_day(day: DayStamp) -> String {
    match DateTime::from_timestamp_millis(day) {
        Some(dt) => dt.format(DAY_FORMAT).to_string(),
        None => day.to_string(),
    }
}

/// Parses a `YYYY-MM-DD` date into the day stamp of its UTC midnight.
pub fn parse_day(input: &str) -> Result<DayStamp, Error> {
    let date = NaiveDate::parse_from_str(input.trim(), INPUT_DAY_FORMAT)
        .map_err(|e| Error::Validation(format!("invalid date '{input}' (expected YYYY-MM-DD): {e}")))?;
    Ok(day_stamp(date))
}

pub fn today() -> DayStamp {
    day_stamp(Utc::now().date_naive())
}

fn day_stamp(date: NaiveDate) -> DayStamp {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Whether `[start, end]` conflicts with any of `existing`.
///
/// Callers pass the groups of a single fish; ranges of different fish
/// never conflict.
pub fn has_overlap(start: DayStamp, end: DayStamp, existing: &[ScheduleGroup]) -> bool {
    first_conflict(DateRange::new(start, end), existing, None).is_some()
}

/// Same as [`has_overlap`] but ignores the group being edited.
pub fn has_overlap_excluding(
    start: DayStamp,
    end: DayStamp,
    existing: &[ScheduleGroup],
    editing: &GroupKey,
) -> bool {
    first_conflict(DateRange::new(start, end), existing, Some(editing)).is_some()
}

/// The first group whose range conflicts with `candidate`.
pub fn first_conflict<'a>(
    candidate: DateRange,
    existing: &'a [ScheduleGroup],
    editing: Option<&GroupKey>,
) -> Option<&'a ScheduleGroup> {
    existing
        .iter()
        .filter(|group| editing != Some(&group.key))
        .find(|group| group.key.range().overlaps(&candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::group::GroupKey;

    fn group(start: DayStamp, end: DayStamp) -> ScheduleGroup {
        ScheduleGroup {
            key: GroupKey::new(1, "Summer", start, end),
            entries: Vec::new(),
        }
    }

    #[test]
    fn partial_overlap() {
        assert!(has_overlap(10, 20, &[group(15, 25)]));
    }

    #[test]
    fn disjoint_ranges() {
        assert!(!has_overlap(10, 20, &[group(21, 30)]));
        assert!(!has_overlap(10, 20, &[group(0, 9)]));
    }

    #[test]
    fn shared_boundary_day_overlaps() {
        assert!(has_overlap(10, 20, &[group(20, 20)]));
        assert!(has_overlap(10, 20, &[group(0, 10)]));
    }

    #[test]
    fn containment_overlaps_both_ways() {
        assert!(has_overlap(10, 20, &[group(12, 14)]));
        assert!(has_overlap(12, 14, &[group(10, 20)]));
    }

    #[test]
    fn symmetric_under_swap() {
        let pairs = [((10, 20), (15, 25)), ((10, 20), (21, 30)), ((1, 1), (1, 1))];
        for ((s1, e1), (s2, e2)) in pairs {
            assert_eq!(
                has_overlap(s1, e1, &[group(s2, e2)]),
                has_overlap(s2, e2, &[group(s1, e1)])
            );
        }
    }

    #[test]
    fn empty_existing_never_conflicts() {
        assert!(!has_overlap(10, 20, &[]));
    }

    #[test]
    fn editing_ignores_its_own_group() {
        let own = group(10, 20);
        let key = own.key.clone();
        assert!(!has_overlap_excluding(10, 20, &[own.clone()], &key));
        assert!(has_overlap_excluding(10, 20, &[own, group(18, 30)], &key));
    }

    #[test]
    fn formats_day_range() {
        // 2024-06-01 and 2024-06-30 at UTC midnight.
        let range = DateRange::new(1_717_200_000_000, 1_719_705_600_000);
        assert_eq!(range.to_string(), "Jun 01, 2024 - Jun 30, 2024");
    }

    #[test]
    fn parses_input_dates_to_utc_midnight() {
        assert_eq!(parse_day("2024-06-01").unwrap(), 1_717_200_000_000);
        assert_eq!(parse_day(" 2024-06-30 ").unwrap(), 1_719_705_600_000);
        assert!(matches!(parse_day("06/01/2024"), Err(Error::Validation(_))));
        assert_eq!(today() % 86_400_000, 0);
    }
}
