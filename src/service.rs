//! Feeding schedule workflows: fish bookkeeping, schedule create/edit/delete
//! and the notifications that follow them.
//!
//! Writes go through the [`Store`] write pool sharded by fish, so two
//! reconciliations of the same fish never interleave. Every write returns a
//! [`PendingResult`]; input that fails validation resolves it immediately
//! without touching the database.

use std::fmt;
use std::sync::Arc;

use chrono::Local;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db;
use crate::error::{Error, Result};
use crate::notify::{
    NotificationOutcome, NotificationTransport, dispatch, format_feed_now, format_group,
    format_schedule,
};
use crate::schedule::{
    DateRange, GroupKey, ReplaceStats, ScheduleGroup, first_conflict, group_and_sort,
    prepare_entries, replace_group,
};
use crate::store::{PendingResult, Store, Subscription, Table};
use crate::types::{DayStamp, EntryQuery, FeedingTimeEntry, Fish, FishId, NewFish};

/// Outcome of a schedule reconciliation that got as far as the database.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplaceResult {
    Replaced {
        key: GroupKey,
        deleted: usize,
        inserted: usize,
        duplicates_removed: usize,
        notification: NotificationOutcome,
    },
    /// The database rejected the write; nothing changed.
    Failed { key: GroupKey, reason: String },
}

impl ReplaceResult {
    pub fn is_replaced(&self) -> bool {
        matches!(self, ReplaceResult::Replaced { .. })
    }
}

/// Rows removed by [`FeedingService::startup_cleanup`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub invalid_fish_removed: usize,
    pub duplicates_removed: usize,
}

/// Feed needed by one fish population on one day.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DailyFeed {
    pub day: DayStamp,
    /// Grams per fish summed over every feeding of the day.
    pub per_fish: f64,
    pub alive_count: u32,
    pub total: f64,
}

impl fmt::Display for DailyFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}g per fish x {} alive = {:.1}g",
            self.per_fish, self.alive_count, self.total
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    /// Replace without checking other groups.
    Replace,
    /// New group; must not overlap any group of the fish.
    Create,
    /// Existing group; may overlap only itself.
    Edit,
}

pub struct FeedingService<'s> {
    store: &'s Store,
    transport: Arc<dyn NotificationTransport>,
}

impl<'s> FeedingService<'s> {
    pub fn new(store: &'s Store, transport: Arc<dyn NotificationTransport>) -> Self {
        Self { store, transport }
    }

    /// Purge entries without a fish, then duplicate rows of every fish.
    pub fn startup_cleanup(&self) -> PendingResult<CleanupReport> {
        self.store.spawn(0, |database| {
            database.write(&[Table::FeedingSchedules], |conn| {
                let report = CleanupReport {
                    invalid_fish_removed: db::delete_entries_with_invalid_fish(conn)?,
                    duplicates_removed: db::remove_duplicate_entries(None, conn)?,
                };
                info!(
                    invalid = report.invalid_fish_removed,
                    duplicates = report.duplicates_removed,
                    "startup cleanup finished"
                );
                Ok(report)
            })
        })
    }

    // Fish

    pub fn add_fish(&self, mut fish: NewFish) -> PendingResult<FishId> {
        fish.name = fish.name.trim().to_owned();
        let alive = fish
            .alive_count
            .unwrap_or(fish.total_count.saturating_sub(fish.dead_count));
        let checked = validate_fish(
            &fish.name,
            (fish.total_count, alive, fish.dead_count),
            [
                fish.average_length,
                fish.average_width,
                fish.average_weight,
                fish.feed_per_fish,
            ],
        );
        if let Err(err) = checked {
            return PendingResult::ready(Err(err));
        }

        self.store.spawn(0, move |database| {
            database.write(&[Table::Fish], |conn| {
                if db::check_fish_exists(&fish.name, conn)? {
                    return Err(Error::Validation(format!(
                        "a fish named '{}' already exists",
                        fish.name
                    ))
                    .into());
                }
                let id = db::insert_fish(&fish, Local::now(), conn)?;
                info!(id, name = %fish.name, "fish added");
                Ok(id)
            })
        })
    }

    /// Save every field of `fish` and stamp its last update time.
    pub fn update_fish(&self, mut fish: Fish) -> PendingResult<usize> {
        let Some(id) = fish.id else {
            return PendingResult::ready(Err(Error::Validation(format!(
                "fish '{}' has no id",
                fish.name
            ))));
        };
        fish.name = fish.name.trim().to_owned();
        let checked = validate_fish(
            &fish.name,
            (fish.total_count, fish.alive_count, fish.dead_count),
            [
                fish.average_length,
                fish.average_width,
                fish.average_weight,
                fish.feed_per_fish,
            ],
        );
        if let Err(err) = checked {
            return PendingResult::ready(Err(err));
        }
        fish.last_updated = Local::now();

        self.store.spawn(id, move |database| {
            database.write(&[Table::Fish], |conn| match db::update_fish(&fish, conn)? {
                0 => Err(Error::NotFound(format!("fish {id}")).into()),
                changed => Ok(changed),
            })
        })
    }

    /// Delete a fish together with its schedule entries.
    pub fn delete_fish(&self, id: FishId) -> PendingResult<usize> {
        self.store.spawn(id, move |database| {
            database.write(&[Table::Fish, Table::FeedingSchedules], |conn| {
                let tx = conn.transaction()?;
                let entries = db::delete_entries_for_fish(id, &tx)?;
                let deleted = db::delete_fish(id, &tx)?;
                if deleted == 0 {
                    return Err(Error::NotFound(format!("fish {id}")).into());
                }
                tx.commit()?;
                info!(id, entries, "fish deleted");
                Ok(deleted)
            })
        })
    }

    /// Remove every fish and schedule entry; returns both counts.
    pub fn clear_database(&self) -> PendingResult<(usize, usize)> {
        warn!("clearing all fish and feeding schedules");
        self.store.clear_database()
    }

    pub fn fish(&self, id: FishId) -> Result<Fish> {
        self.store
            .fish_by_id(id)?
            .ok_or_else(|| Error::NotFound(format!("fish {id}")))
    }

    pub fn all_fish(&self) -> Result<Vec<Fish>> {
        self.store.all_fish()
    }

    pub fn fish_named(&self, name: &str) -> Result<Fish> {
        self.store
            .fish_by_name(name.trim())?
            .ok_or_else(|| Error::NotFound(format!("fish '{}'", name.trim())))
    }

    // Schedules

    /// Replace the entries of `key` with `entries`, whatever else the fish
    /// has scheduled.
    pub fn replace_group(
        &self,
        key: GroupKey,
        entries: &[FeedingTimeEntry],
    ) -> PendingResult<ReplaceResult> {
        self.reconcile(key, entries, Flow::Replace)
    }

    /// Create a new group for `fish_id`. Rejected with [`Error::Overlap`]
    /// when the range shares a day with another group of the same fish.
    pub fn create_schedule(
        &self,
        fish_id: FishId,
        schedule_name: &str,
        range: DateRange,
        entries: &[FeedingTimeEntry],
    ) -> PendingResult<ReplaceResult> {
        let key = GroupKey::new(fish_id, schedule_name, range.start, range.end);
        self.reconcile(key, entries, Flow::Create)
    }

    /// Replace the entries of an existing group.
    pub fn edit_schedule(
        &self,
        key: GroupKey,
        entries: &[FeedingTimeEntry],
    ) -> PendingResult<ReplaceResult> {
        self.reconcile(key, entries, Flow::Edit)
    }

    /// Remove exactly the rows of `key`.
    pub fn delete_schedule(&self, key: GroupKey) -> PendingResult<usize> {
        self.store.spawn(key.fish_id, move |database| {
            database.write(&[Table::FeedingSchedules], |conn| {
                let deleted = db::delete_entries_matching(
                    key.fish_id,
                    Some(&key.schedule_name),
                    key.start_date,
                    key.end_date,
                    conn,
                )?;
                if deleted == 0 {
                    return Err(Error::NotFound(format!(
                        "schedule '{}' ({})",
                        key.schedule_name,
                        key.range()
                    ))
                    .into());
                }
                info!(fish_id = key.fish_id, schedule = %key.schedule_name, deleted, "schedule deleted");
                Ok(deleted)
            })
        })
    }

    /// Groups of one fish, oldest first.
    pub fn schedule_groups(&self, fish_id: FishId) -> Result<Vec<ScheduleGroup>> {
        group_and_sort(&self.store.entries_for_fish(fish_id)?)
    }

    /// Groups of one fish carrying `schedule_name`, oldest first.
    pub fn groups_named(&self, fish_id: FishId, schedule_name: &str) -> Result<Vec<ScheduleGroup>> {
        let name = schedule_name.trim().to_owned();
        let entries = self
            .store
            .read(|conn| db::query_entries(EntryQuery::ByName(fish_id, name), conn))?;
        group_and_sort(&entries)
    }

    /// Deliver the groups of `fish_id` now and after every schedule change.
    pub fn watch_schedule_groups<F>(&self, fish_id: FishId, callback: F) -> Result<Subscription>
    where
        F: Fn(Result<Vec<ScheduleGroup>>) + Send + Sync + 'static,
    {
        self.store
            .subscribe_entries_for_fish(fish_id, move |entries| callback(group_and_sort(&entries)))
    }

    /// Send one stored group to its fish's phone.
    pub fn send_schedule(&self, key: &GroupKey) -> Result<NotificationOutcome> {
        let fish = self.fish(key.fish_id)?;
        let group = self
            .schedule_groups(key.fish_id)?
            .into_iter()
            .find(|group| group.key == *key)
            .ok_or_else(|| {
                Error::NotFound(format!("schedule '{}' ({})", key.schedule_name, key.range()))
            })?;
        Ok(self.notify(&fish, &format_group(&fish.name, &group)))
    }

    /// Send every group of `fish_id`, one message each, oldest first.
    pub fn send_all_schedules(
        &self,
        fish_id: FishId,
    ) -> Result<Vec<(GroupKey, NotificationOutcome)>> {
        let fish = self.fish(fish_id)?;
        Ok(self
            .schedule_groups(fish_id)?
            .into_iter()
            .map(|group| {
                let outcome = self.notify(&fish, &format_group(&fish.name, &group));
                (group.key, outcome)
            })
            .collect())
    }

    /// Ask the feeder to dispense `amount` grams per fish right away.
    pub fn feed_now(&self, fish_id: FishId, amount: f64) -> Result<NotificationOutcome> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::Validation(
                "feed amount must be greater than 0".to_owned(),
            ));
        }
        let fish = self.fish(fish_id)?;
        if fish.destination().is_none() {
            return Err(Error::Validation(format!(
                "fish '{}' has no phone number",
                fish.name
            )));
        }
        let command = format_feed_now(&fish.name, amount, Local::now().naive_local());
        Ok(self.notify(&fish, &command))
    }

    /// Feed due on `day`: every feeding of the groups active that day.
    pub fn daily_feed(&self, fish_id: FishId, day: DayStamp) -> Result<DailyFeed> {
        let fish = self.fish(fish_id)?;
        let per_fish: f64 = group_and_sort(&self.store.entries_for_date(fish_id, day)?)?
            .iter()
            .map(ScheduleGroup::daily_quantity)
            .sum();
        Ok(DailyFeed {
            day,
            per_fish,
            alive_count: fish.alive_count,
            total: per_fish * f64::from(fish.alive_count),
        })
    }

    fn notify(&self, fish: &Fish, body: &str) -> NotificationOutcome {
        dispatch(self.transport.as_ref(), fish.destination(), body)
    }

    fn reconcile(
        &self,
        mut key: GroupKey,
        entries: &[FeedingTimeEntry],
        flow: Flow,
    ) -> PendingResult<ReplaceResult> {
        key.schedule_name = key.schedule_name.trim().to_owned();
        let rows = match prepare_entries(&key, entries) {
            Ok(rows) => rows,
            Err(err) => return PendingResult::ready(Err(err)),
        };
        let transport = Arc::clone(&self.transport);

        self.store.spawn(key.fish_id, move |database| {
            let written = database.write(&[Table::FeedingSchedules], |conn| {
                let fish = check_flow(conn, &key, flow)?;
                let stats = replace_group(conn, &key, &rows)?;
                Ok((fish, stats))
            });

            match written {
                Ok((fish, stats)) => {
                    let ReplaceStats {
                        deleted,
                        inserted,
                        duplicates_removed,
                    } = stats;
                    let notification = match fish {
                        Some(fish) => {
                            let body =
                                format_schedule(&fish.name, &key.schedule_name, key.range(), &rows);
                            dispatch(transport.as_ref(), fish.destination(), &body)
                        }
                        None => NotificationOutcome::NoDestination,
                    };
                    debug!(fish_id = key.fish_id, %notification, "schedule reconciled");
                    Ok(ReplaceResult::Replaced {
                        key,
                        deleted,
                        inserted,
                        duplicates_removed,
                        notification,
                    })
                }
                Err(Error::Persistence(reason)) => Ok(ReplaceResult::Failed { key, reason }),
                Err(err) => Err(err),
            }
        })
    }
}

/// Checks that must hold right before a group is replaced. Returns the
/// owning fish when there is one.
fn check_flow(conn: &Connection, key: &GroupKey, flow: Flow) -> anyhow::Result<Option<Fish>> {
    let fish = db::query_fish_by_id(key.fish_id, conn)?;
    if flow == Flow::Replace {
        return Ok(fish);
    }
    if fish.is_none() {
        return Err(Error::NotFound(format!("fish {}", key.fish_id)).into());
    }

    let groups = group_and_sort(&db::query_entries_for_fish(key.fish_id, conn)?)?;
    let editing = match flow {
        Flow::Edit => {
            if !groups.iter().any(|group| group.key == *key) {
                return Err(Error::NotFound(format!(
                    "schedule '{}' ({})",
                    key.schedule_name,
                    key.range()
                ))
                .into());
            }
            Some(key)
        }
        _ => None,
    };
    if let Some(existing) = first_conflict(key.range(), &groups, editing) {
        info!(
            fish_id = key.fish_id,
            requested = %key.range(),
            existing = %existing.key.schedule_name,
            "schedule rejected: date range overlaps"
        );
        return Err(Error::Overlap {
            requested: key.range(),
            existing: existing.key.clone(),
        }
        .into());
    }
    Ok(fish)
}

const MEASURES: [&str; 4] = ["average length", "average width", "average weight", "feed per fish"];

/// `counts` is (total, alive, dead); `measures` follow [`MEASURES`].
fn validate_fish(name: &str, counts: (u32, u32, u32), measures: [f64; 4]) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("fish name is empty".to_owned()));
    }
    let (total, alive, dead) = counts;
    if dead > total {
        return Err(Error::Validation(format!(
            "dead count {dead} exceeds total count {total}"
        )));
    }
    if u64::from(alive) + u64::from(dead) > u64::from(total) {
        return Err(Error::Validation(format!(
            "alive ({alive}) plus dead ({dead}) exceeds total count {total}"
        )));
    }
    for (label, value) in MEASURES.iter().zip(measures) {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::Validation(format!("{label} must be 0 or more")));
        }
    }
    Ok(())
}
