//! Persistence handle shared by every component.
//!
//! A `Store` is created once at start-up and passed by reference to the
//! components that need it. Writes run on the write pool and hand back a
//! [`PendingResult`]; reads run on the caller's thread; live queries push
//! fresh values after each committed write. Call [`Store::shutdown`] (or
//! drop the store) to drain pending writes and stop the workers.

mod live;
mod pool;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use rusqlite::Connection;
use tracing::{error, info};

use crate::db;
use crate::error::{Error, Result};
use crate::types::{
    DayStamp, EntryId, EntryQuery, FeedingScheduleEntry, Fish, FishId, FishQuery, NewFish,
};

pub use live::{Subscription, Table};
pub use pool::{DEFAULT_WORKERS, MAX_WORKERS, PendingResult};

use live::LiveQueries;
use pool::WritePool;

const FISH: &[Table] = &[Table::Fish];
const SCHEDULES: &[Table] = &[Table::FeedingSchedules];
const ALL_TABLES: &[Table] = &[Table::Fish, Table::FeedingSchedules];

/// Connection plus live-query registry; what a job running on the pool sees.
pub struct Database {
    conn: Mutex<Connection>,
    live: Arc<LiveQueries>,
}

impl Database {
    /// Run `op` under the write lock, then refresh live queries on `tables`
    /// if it succeeded.
    pub fn write<T, F>(&self, tables: &[Table], op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> anyhow::Result<T>,
    {
        let result = {
            let mut conn = self.lock()?;
            op(&mut *conn)
        };
        match result {
            Ok(value) => {
                self.live.refresh(&self.conn, tables);
                Ok(value)
            }
            Err(err) => {
                let err = Error::from(err);
                if let Error::Persistence(reason) = &err {
                    error!("write failed: {reason}");
                }
                Err(err)
            }
        }
    }

    pub fn read<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let conn = self.lock()?;
        Ok(op(&*conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Persistence(format!("database lock poisoned: {e}")))
    }
}

pub struct Store {
    db: Arc<Database>,
    pool: WritePool,
}

impl Store {
    /// Open (or create) the database file and start `workers` write workers.
    pub fn open(path: &Path, workers: usize) -> Result<Self> {
        let conn = db::init(path)?;
        info!(path = %path.display(), workers, "opened feeding schedule database");
        Self::with_connection(conn, workers)
    }

    pub fn open_in_memory(workers: usize) -> Result<Self> {
        Self::with_connection(db::init_in_memory()?, workers)
    }

    fn with_connection(conn: Connection, workers: usize) -> Result<Self> {
        Ok(Self {
            db: Arc::new(Database {
                conn: Mutex::new(conn),
                live: Arc::new(LiveQueries::default()),
            }),
            pool: WritePool::new(workers)?,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    /// Run `job` on the worker that owns `shard`.
    pub fn spawn<T, F>(&self, shard: i64, job: F) -> PendingResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let (tx, pending) = PendingResult::channel();
        let db = Arc::clone(&self.db);
        let submitted = self.pool.submit(
            shard,
            Box::new(move || {
                let _ = tx.send(job(db.as_ref()));
            }),
        );
        match submitted {
            Ok(()) => pending,
            Err(err) => PendingResult::ready(Err(err)),
        }
    }

    /// Run a single write on the worker that owns `shard`.
    pub fn write<T, F>(&self, shard: i64, tables: &'static [Table], op: F) -> PendingResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
    {
        self.spawn(shard, move |db| db.write(tables, op))
    }

    pub fn read<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        self.db.read(op)
    }

    /// Run `query` now and after every committed write to `table`, handing
    /// each result to `callback` until the subscription is cancelled.
    pub fn subscribe<T, Q, F>(&self, table: Table, query: Q, callback: F) -> Result<Subscription>
    where
        T: Send + 'static,
        Q: Fn(&Connection) -> anyhow::Result<T> + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.db.live.subscribe(&self.db.conn, table, query, callback)
    }

    /// Drain queued writes and stop the workers.
    pub fn shutdown(mut self) {
        self.pool.shutdown();
        info!("feeding schedule database closed");
    }

    // Fish

    pub fn insert_fish(&self, fish: NewFish) -> PendingResult<FishId> {
        self.write(0, FISH, move |conn| db::insert_fish(&fish, Local::now(), conn))
    }

    pub fn update_fish(&self, fish: Fish) -> PendingResult<usize> {
        let shard = fish.id.unwrap_or_default();
        self.write(shard, FISH, move |conn| db::update_fish(&fish, conn))
    }

    pub fn delete_fish(&self, id: FishId) -> PendingResult<usize> {
        self.write(id, FISH, move |conn| db::delete_fish(id, conn))
    }

    pub fn delete_all_fish(&self) -> PendingResult<usize> {
        self.write(0, FISH, |conn| db::delete_all_fish(conn))
    }

    /// Remove every fish and every schedule entry.
    pub fn clear_database(&self) -> PendingResult<(usize, usize)> {
        self.write(0, ALL_TABLES, |conn| {
            let tx = conn.transaction()?;
            let entries = db::delete_all_entries(&tx)?;
            let fish = db::delete_all_fish(&tx)?;
            tx.commit()?;
            Ok((fish, entries))
        })
    }

    pub fn fish_by_id(&self, id: FishId) -> Result<Option<Fish>> {
        self.read(|conn| db::query_fish_by_id(id, conn))
    }

    pub fn fish_by_name(&self, name: &str) -> Result<Option<Fish>> {
        self.read(|conn| db::query_fish_by_name(name, conn))
    }

    pub fn all_fish(&self) -> Result<Vec<Fish>> {
        self.read(|conn| db::query_fish(FishQuery::All, conn))
    }

    pub fn subscribe_all_fish<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(Vec<Fish>) + Send + Sync + 'static,
    {
        self.subscribe(Table::Fish, db::query_all_fish, callback)
    }

    // Feeding schedules

    pub fn insert_schedule_entries(
        &self,
        entries: Vec<FeedingScheduleEntry>,
    ) -> PendingResult<Vec<EntryId>> {
        let shard = entries.first().map(|e| e.fish_id).unwrap_or_default();
        self.write(shard, SCHEDULES, move |conn| {
            let tx = conn.transaction()?;
            let ids = db::insert_schedule_entries(&entries, &tx)?;
            tx.commit()?;
            Ok(ids)
        })
    }

    pub fn delete_entries_matching(
        &self,
        fish_id: FishId,
        schedule_name: Option<String>,
        start_date: DayStamp,
        end_date: DayStamp,
    ) -> PendingResult<usize> {
        self.write(fish_id, SCHEDULES, move |conn| {
            db::delete_entries_matching(fish_id, schedule_name.as_deref(), start_date, end_date, conn)
        })
    }

    pub fn delete_entries_with_invalid_fish(&self) -> PendingResult<usize> {
        self.write(0, SCHEDULES, |conn| db::delete_entries_with_invalid_fish(conn))
    }

    pub fn remove_duplicate_entries(&self, fish_id: Option<FishId>) -> PendingResult<usize> {
        self.write(fish_id.unwrap_or_default(), SCHEDULES, move |conn| {
            db::remove_duplicate_entries(fish_id, conn)
        })
    }

    pub fn entries_for_fish(&self, fish_id: FishId) -> Result<Vec<FeedingScheduleEntry>> {
        self.read(|conn| db::query_entries_for_fish(fish_id, conn))
    }

    pub fn entries_for_date(
        &self,
        fish_id: FishId,
        day: DayStamp,
    ) -> Result<Vec<FeedingScheduleEntry>> {
        self.read(|conn| db::query_entries(EntryQuery::ForDate(fish_id, day), conn))
    }

    pub fn entries_for_date_range(
        &self,
        fish_id: FishId,
        start: DayStamp,
        end: DayStamp,
    ) -> Result<Vec<FeedingScheduleEntry>> {
        self.read(|conn| db::query_entries(EntryQuery::ForDateRange(fish_id, start, end), conn))
    }

    pub fn all_entries(&self) -> Result<Vec<FeedingScheduleEntry>> {
        self.read(|conn| db::query_entries(EntryQuery::All, conn))
    }

    pub fn subscribe_entries_for_fish<F>(&self, fish_id: FishId, callback: F) -> Result<Subscription>
    where
        F: Fn(Vec<FeedingScheduleEntry>) + Send + Sync + 'static,
    {
        self.subscribe(
            Table::FeedingSchedules,
            move |conn| db::query_entries_for_fish(fish_id, conn),
            callback,
        )
    }
}
