//! Replacement of one schedule group's stored entries.
//!
//! A replace runs in three steps inside a single transaction: delete the
//! group's current rows, insert the submitted entries (one per feeding
//! time, last write wins), then drop any row of the same fish that
//! duplicates another on name, range and time, keeping the lowest id.

use std::collections::BTreeMap;

use rusqlite::Connection;
use tracing::debug;

use crate::db;
use crate::error::Error;
use crate::schedule::group::GroupKey;
use crate::schedule::time::FeedingTime;
use crate::types::{FeedingScheduleEntry, FeedingTimeEntry};

/// Row counts of one committed replace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaceStats {
    pub deleted: usize,
    pub inserted: usize,
    pub duplicates_removed: usize,
}

/// Validate `entries` for `key` and turn them into rows ready to insert,
/// one per distinct feeding time in chronological order.
pub fn prepare_entries(
    key: &GroupKey,
    entries: &[FeedingTimeEntry],
) -> Result<Vec<FeedingScheduleEntry>, Error> {
    if entries.is_empty() {
        return Err(Error::Validation(
            "a schedule needs at least one feeding time".to_owned(),
        ));
    }
    if key.schedule_name.trim().is_empty() {
        return Err(Error::Validation("schedule name is empty".to_owned()));
    }
    if !key.range().is_valid() {
        return Err(Error::Validation(format!(
            "schedule starts after it ends ({} > {})",
            key.start_date, key.end_date
        )));
    }

    let mut by_time: BTreeMap<FeedingTime, f64> = BTreeMap::new();
    for entry in entries {
        let time: FeedingTime = entry.time.parse()?;
        if !entry.quantity.is_finite() || entry.quantity <= 0.0 {
            return Err(Error::Validation(format!(
                "feed quantity at {time} must be greater than 0"
            )));
        }
        by_time.insert(time, entry.quantity);
    }

    Ok(by_time
        .into_iter()
        .map(|(time, quantity)| FeedingScheduleEntry {
            id: None,
            fish_id: key.fish_id,
            schedule_name: key.schedule_name.clone(),
            start_date: key.start_date,
            end_date: key.end_date,
            feeding_time: time.to_string(),
            feed_quantity: quantity,
        })
        .collect())
}

/// Atomically replace the rows of `key` with `rows` from [`prepare_entries`].
pub fn replace_group(
    conn: &mut Connection,
    key: &GroupKey,
    rows: &[FeedingScheduleEntry],
) -> anyhow::Result<ReplaceStats> {
    let tx = conn.transaction()?;
    let deleted = db::delete_entries_matching(
        key.fish_id,
        Some(&key.schedule_name),
        key.start_date,
        key.end_date,
        &tx,
    )?;
    let inserted = db::insert_schedule_entries(rows, &tx)?.len();
    let duplicates_removed = db::remove_duplicate_entries(Some(key.fish_id), &tx)?;
    tx.commit()?;

    debug!(
        fish_id = key.fish_id,
        schedule = %key.schedule_name,
        deleted,
        inserted,
        duplicates_removed,
        "replaced schedule group"
    );
    Ok(ReplaceStats {
        deleted,
        inserted,
        duplicates_removed,
    })
}
