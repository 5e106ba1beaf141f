//! Schedule groups: time parsing, grouping and ordering, overlap checks
//! and reconciliation of stored entries.

pub mod group;
pub mod overlap;
pub mod reconcile;
pub mod time;

pub use group::{GroupKey, ScheduleGroup, group_and_sort};
pub use overlap::{
    DateRange, first_conflict, format_day, has_overlap, has_overlap_excluding, parse_day, today,
};
pub use reconcile::{ReplaceStats, prepare_entries, replace_group};
pub use time::FeedingTime;
