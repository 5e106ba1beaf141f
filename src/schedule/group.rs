//! Grouping of flat schedule rows into schedule groups, and their ordering.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::warn;

use crate::error::Error;
use crate::schedule::overlap::DateRange;
use crate::schedule::time::FeedingTime;
use crate::types::{DayStamp, FeedingScheduleEntry, FishId};

/// Identity of a schedule group: every entry sharing these four fields
/// belongs to the same group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub fish_id: FishId,
    pub schedule_name: String,
    pub start_date: DayStamp,
    pub end_date: DayStamp,
}

impl GroupKey {
    pub fn new(
        fish_id: FishId,
        schedule_name: impl Into<String>,
        start_date: DayStamp,
        end_date: DayStamp,
    ) -> Self {
        Self {
            fish_id,
            schedule_name: schedule_name.into(),
            start_date,
            end_date,
        }
    }

    pub fn of(entry: &FeedingScheduleEntry) -> Self {
        Self::new(
            entry.fish_id,
            entry.schedule_name.clone(),
            entry.start_date,
            entry.end_date,
        )
    }

    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }

    pub fn matches(&self, entry: &FeedingScheduleEntry) -> bool {
        entry.fish_id == self.fish_id
            && entry.schedule_name == self.schedule_name
            && entry.start_date == self.start_date
            && entry.end_date == self.end_date
    }

    /// Display order: oldest start first, then name, end date and fish.
    pub fn chronological(&self, other: &GroupKey) -> Ordering {
        self.start_date
            .cmp(&other.start_date)
            .then_with(|| self.schedule_name.cmp(&other.schedule_name))
            .then_with(|| self.end_date.cmp(&other.end_date))
            .then_with(|| self.fish_id.cmp(&other.fish_id))
    }
}

/// The entries of one group, one per distinct feeding time, in
/// chronological order.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleGroup {
    pub key: GroupKey,
    pub entries: Vec<FeedingScheduleEntry>,
}

impl ScheduleGroup {
    /// Grams per fish across all feedings of one day.
    pub fn daily_quantity(&self) -> f64 {
        self.entries.iter().map(|e| e.feed_quantity).sum()
    }
}

/// Partition `entries` into groups, collapse duplicate feeding times and
/// sort groups and entries chronologically.
///
/// When two rows of one group share a feeding time the row with the
/// highest id survives; rows without an id count as newest and, among
/// equals, the later row in `entries` wins. A stored time that does not
/// parse is reported as [`Error::Integrity`].
pub fn group_and_sort<'a, I>(entries: I) -> Result<Vec<ScheduleGroup>, Error>
where
    I: IntoIterator<Item = &'a FeedingScheduleEntry>,
{
    let mut groups: HashMap<GroupKey, HashMap<FeedingTime, FeedingScheduleEntry>> =
        HashMap::new();

    for entry in entries {
        let time = entry.feeding_time.parse::<FeedingTime>().map_err(|_| {
            warn!(
                id = ?entry.id,
                fish_id = entry.fish_id,
                feeding_time = %entry.feeding_time,
                "unparseable feeding time in stored schedule"
            );
            Error::Integrity(format!(
                "entry {:?} of schedule '{}' has unparseable feeding time '{}'",
                entry.id, entry.schedule_name, entry.feeding_time
            ))
        })?;
        let by_time = groups.entry(GroupKey::of(entry)).or_default();
        match by_time.get(&time) {
            Some(existing) if !supersedes(entry, existing) => {}
            _ => {
                by_time.insert(time, entry.clone());
            }
        }
    }

    let mut result: Vec<ScheduleGroup> = groups
        .into_iter()
        .map(|(key, by_time)| {
            let mut timed: Vec<(FeedingTime, FeedingScheduleEntry)> = by_time.into_iter().collect();
            timed.sort_by(|a, b| a.0.cmp(&b.0));
            ScheduleGroup {
                key,
                entries: timed.into_iter().map(|(_, entry)| entry).collect(),
            }
        })
        .collect();
    result.sort_by(|a, b| a.key.chronological(&b.key));
    Ok(result)
}

/// Whether `candidate` should replace `existing` for the same feeding time.
fn supersedes(candidate: &FeedingScheduleEntry, existing: &FeedingScheduleEntry) -> bool {
    candidate.id.unwrap_or(i64::MAX) >= existing.id.unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, name: &str, start: i64, end: i64, time: &str, qty: f64) -> FeedingScheduleEntry {
        FeedingScheduleEntry {
            id: Some(id),
            fish_id: 1,
            schedule_name: name.to_owned(),
            start_date: start,
            end_date: end,
            feeding_time: time.to_owned(),
            feed_quantity: qty,
        }
    }

    fn times(group: &ScheduleGroup) -> Vec<&str> {
        group.entries.iter().map(|e| e.feeding_time.as_str()).collect()
    }

    #[test]
    fn groups_by_name_and_range() {
        let rows = vec![
            entry(1, "Summer", 10, 20, "7:00 AM", 30.0),
            entry(2, "Summer", 10, 20, "5:00 PM", 30.0),
            entry(3, "Summer", 21, 30, "7:00 AM", 25.0),
            entry(4, "Winter", 10, 20, "8:00 AM", 10.0),
        ];
        let groups = group_and_sort(&rows).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].key, GroupKey::new(1, "Summer", 10, 20));
        assert_eq!(times(&groups[0]), ["7:00 AM", "5:00 PM"]);
        assert_eq!(groups[1].key, GroupKey::new(1, "Winter", 10, 20));
        assert_eq!(groups[2].key, GroupKey::new(1, "Summer", 21, 30));
    }

    #[test]
    fn delimiter_in_name_does_not_collide() {
        let rows = vec![
            entry(1, "a_1", 2, 3, "7:00 AM", 1.0),
            entry(2, "a", 1, 2, "7:00 AM", 1.0),
        ];
        let groups = group_and_sort(&rows).unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn sorts_times_across_midnight() {
        let rows = vec![
            entry(1, "Day", 0, 0, "11:30 PM", 1.0),
            entry(2, "Day", 0, 0, "12:00 AM", 1.0),
            entry(3, "Day", 0, 0, "6:00 AM", 1.0),
        ];
        let groups = group_and_sort(&rows).unwrap();
        assert_eq!(times(&groups[0]), ["12:00 AM", "6:00 AM", "11:30 PM"]);
    }

    #[test]
    fn duplicate_time_keeps_highest_id() {
        let rows = vec![
            entry(9, "Summer", 10, 20, "7:00 AM", 40.0),
            entry(3, "Summer", 10, 20, "7:00 AM", 30.0),
        ];
        let groups = group_and_sort(&rows).unwrap();
        assert_eq!(groups[0].entries.len(), 1);
        assert_eq!(groups[0].entries[0].id, Some(9));
        assert_eq!(groups[0].entries[0].feed_quantity, 40.0);
    }

    #[test]
    fn unsaved_duplicates_keep_last_written() {
        let mut first = entry(0, "Summer", 10, 20, "7:00 AM", 10.0);
        first.id = None;
        let mut second = first.clone();
        second.feed_quantity = 12.5;
        let groups = group_and_sort(&[first, second]).unwrap();
        assert_eq!(groups[0].entries[0].feed_quantity, 12.5);
    }

    #[test]
    fn grouping_is_idempotent() {
        let rows = vec![
            entry(5, "Summer", 21, 30, "9:00 PM", 1.0),
            entry(1, "Summer", 10, 20, "10:00 AM", 2.0),
            entry(2, "Summer", 10, 20, "2:00 PM", 3.0),
            entry(3, "Summer", 10, 20, "10:00 AM", 4.0),
            entry(4, "Autumn", 10, 20, "6:00 AM", 5.0),
        ];
        let once = group_and_sort(&rows).unwrap();
        let flat: Vec<FeedingScheduleEntry> =
            once.iter().flat_map(|g| g.entries.iter().cloned()).collect();
        let twice = group_and_sort(&flat).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unparseable_time_is_integrity_error() {
        let rows = vec![entry(1, "Summer", 10, 20, "25:99", 1.0)];
        assert!(matches!(group_and_sort(&rows), Err(Error::Integrity(_))));
    }

    #[test]
    fn daily_quantity_sums_entries() {
        let rows = vec![
            entry(1, "Summer", 10, 20, "7:00 AM", 30.0),
            entry(2, "Summer", 10, 20, "5:00 PM", 12.5),
        ];
        let groups = group_and_sort(&rows).unwrap();
        assert_eq!(groups[0].daily_quantity(), 42.5);
    }
}
