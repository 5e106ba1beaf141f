/// Feeding schedule database queries.
use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::types::{
    DayStamp, EntryId, EntryQuery, FeedingScheduleEntry, FishId, INVALID_FISH_ID,
};

const ENTRY_COLUMNS: &str =
    "id, fish_id, schedule_name, start_date, end_date, feeding_time, feed_quantity";

/// Inserts `entries` in order and returns their new ids.
pub fn insert_schedule_entries(
    entries: &[FeedingScheduleEntry],
    conn: &Connection,
) -> Result<Vec<EntryId>> {
    let mut stmt = conn.prepare(
        "INSERT INTO feeding_schedules
             (fish_id, schedule_name, start_date, end_date, feeding_time, feed_quantity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        stmt.execute(rusqlite::params![
            entry.fish_id,
            entry.schedule_name,
            entry.start_date,
            entry.end_date,
            entry.feeding_time,
            entry.feed_quantity,
        ])?;
        ids.push(conn.last_insert_rowid());
    }
    Ok(ids)
}

/// Deletes the entries of one fish whose range is exactly `[start, end]`.
/// With `schedule_name` set only that schedule's entries go.
pub fn delete_entries_matching(
    fish_id: FishId,
    schedule_name: Option<&str>,
    start_date: DayStamp,
    end_date: DayStamp,
    conn: &Connection,
) -> Result<usize> {
    let deleted = match schedule_name {
        Some(name) => conn.execute(
            "DELETE FROM feeding_schedules
             WHERE fish_id = ?1 AND schedule_name = ?2 AND start_date = ?3 AND end_date = ?4",
            rusqlite::params![fish_id, name, start_date, end_date],
        )?,
        None => conn.execute(
            "DELETE FROM feeding_schedules
             WHERE fish_id = ?1 AND start_date = ?2 AND end_date = ?3",
            rusqlite::params![fish_id, start_date, end_date],
        )?,
    };
    Ok(deleted)
}

pub fn delete_entries_for_fish(fish_id: FishId, conn: &Connection) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM feeding_schedules WHERE fish_id = ?1",
        [fish_id],
    )?)
}

/// Purges entries saved without a fish.
pub fn delete_entries_with_invalid_fish(conn: &Connection) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM feeding_schedules WHERE fish_id = ?1",
        [INVALID_FISH_ID],
    )?)
}

pub fn delete_all_entries(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM feeding_schedules", [])?)
}

/// Removes rows that repeat another row's schedule name, range and
/// feeding time, keeping the lowest id. Limited to one fish when given.
pub fn remove_duplicate_entries(fish_id: Option<FishId>, conn: &Connection) -> Result<usize> {
    let removed = match fish_id {
        Some(fish_id) => conn.execute(
            "DELETE FROM feeding_schedules
             WHERE fish_id = ?1 AND id NOT IN (
                 SELECT MIN(id) FROM feeding_schedules WHERE fish_id = ?1
                 GROUP BY schedule_name, start_date, end_date, feeding_time
             )",
            [fish_id],
        )?,
        None => conn.execute(
            "DELETE FROM feeding_schedules
             WHERE id NOT IN (
                 SELECT MIN(id) FROM feeding_schedules
                 GROUP BY fish_id, schedule_name, start_date, end_date, feeding_time
             )",
            [],
        )?,
    };
    Ok(removed)
}

pub fn query_entries(query: EntryQuery, conn: &Connection) -> Result<Vec<FeedingScheduleEntry>> {
    match query {
        EntryQuery::All => select_entries("1 = 1", [], conn),
        EntryQuery::ByFish(fish_id) => {
            select_entries("fish_id = ?1", rusqlite::params![fish_id], conn)
        }
        EntryQuery::ForDate(fish_id, day) => select_entries(
            "fish_id = ?1 AND ?2 BETWEEN start_date AND end_date",
            rusqlite::params![fish_id, day],
            conn,
        ),
        EntryQuery::ForDateRange(fish_id, start, end) => select_entries(
            "fish_id = ?1 AND start_date <= ?3 AND end_date >= ?2",
            rusqlite::params![fish_id, start, end],
            conn,
        ),
        EntryQuery::ByName(fish_id, name) => select_entries(
            "fish_id = ?1 AND schedule_name = ?2",
            rusqlite::params![fish_id, name],
            conn,
        ),
    }
}

pub fn query_entries_for_fish(
    fish_id: FishId,
    conn: &Connection,
) -> Result<Vec<FeedingScheduleEntry>> {
    query_entries(EntryQuery::ByFish(fish_id), conn)
}

fn select_entries<P: rusqlite::Params>(
    filter: &str,
    params: P,
    conn: &Connection,
) -> Result<Vec<FeedingScheduleEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM feeding_schedules WHERE {filter} ORDER BY id"
    ))?;
    let rows = stmt.query_map(params, row_to_entry)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<FeedingScheduleEntry> {
    Ok(FeedingScheduleEntry {
        id: Some(row.get(0)?),
        fish_id: row.get(1)?,
        schedule_name: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        feeding_time: row.get(5)?,
        feed_quantity: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn entry(fish_id: FishId, name: &str, start: i64, end: i64, time: &str) -> FeedingScheduleEntry {
        FeedingScheduleEntry {
            id: None,
            fish_id,
            schedule_name: name.to_owned(),
            start_date: start,
            end_date: end,
            feeding_time: time.to_owned(),
            feed_quantity: 10.0,
        }
    }

    #[test]
    fn insert_returns_ids_in_order() {
        let conn = conn();
        let ids = insert_schedule_entries(
            &[entry(1, "S", 1, 2, "7:00 AM"), entry(1, "S", 1, 2, "8:00 AM")],
            &conn,
        )
        .unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
        let stored = query_entries_for_fish(1, &conn).unwrap();
        assert_eq!(stored[0].id, Some(ids[0]));
        assert_eq!(stored[1].feeding_time, "8:00 AM");
    }

    #[test]
    fn delete_matching_with_and_without_name() {
        let conn = conn();
        insert_schedule_entries(
            &[
                entry(1, "A", 10, 20, "7:00 AM"),
                entry(1, "B", 10, 20, "7:00 AM"),
                entry(1, "A", 21, 30, "7:00 AM"),
                entry(2, "A", 10, 20, "7:00 AM"),
            ],
            &conn,
        )
        .unwrap();
        assert_eq!(delete_entries_matching(1, Some("A"), 10, 20, &conn).unwrap(), 1);
        assert_eq!(query_entries_for_fish(1, &conn).unwrap().len(), 2);
        assert_eq!(delete_entries_matching(1, None, 10, 20, &conn).unwrap(), 1);
        let left = query_entries(EntryQuery::All, &conn).unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.iter().any(|e| e.fish_id == 2));
    }

    #[test]
    fn removes_duplicates_keeping_lowest_id() {
        let conn = conn();
        let ids = insert_schedule_entries(
            &[
                entry(1, "A", 10, 20, "7:00 AM"),
                entry(1, "A", 10, 20, "7:00 AM"),
                entry(1, "A", 10, 20, "8:00 AM"),
                entry(2, "A", 10, 20, "7:00 AM"),
                entry(2, "A", 10, 20, "7:00 AM"),
            ],
            &conn,
        )
        .unwrap();
        assert_eq!(remove_duplicate_entries(Some(1), &conn).unwrap(), 1);
        let fish_one = query_entries_for_fish(1, &conn).unwrap();
        assert_eq!(fish_one.len(), 2);
        assert_eq!(fish_one[0].id, Some(ids[0]));
        assert_eq!(query_entries_for_fish(2, &conn).unwrap().len(), 2);
        assert_eq!(remove_duplicate_entries(None, &conn).unwrap(), 1);
        assert_eq!(query_entries_for_fish(2, &conn).unwrap().len(), 1);
    }

    #[test]
    fn purges_invalid_fish() {
        let conn = conn();
        insert_schedule_entries(
            &[
                entry(INVALID_FISH_ID, "A", 1, 2, "7:00 AM"),
                entry(1, "A", 1, 2, "7:00 AM"),
            ],
            &conn,
        )
        .unwrap();
        assert_eq!(delete_entries_with_invalid_fish(&conn).unwrap(), 1);
        assert_eq!(query_entries(EntryQuery::All, &conn).unwrap().len(), 1);
    }

    #[test]
    fn date_queries_are_inclusive() {
        let conn = conn();
        insert_schedule_entries(
            &[entry(1, "A", 10, 20, "7:00 AM"), entry(1, "B", 21, 30, "7:00 AM")],
            &conn,
        )
        .unwrap();
        assert_eq!(query_entries(EntryQuery::ForDate(1, 20), &conn).unwrap().len(), 1);
        assert_eq!(query_entries(EntryQuery::ForDate(1, 21), &conn).unwrap()[0].schedule_name, "B");
        assert!(query_entries(EntryQuery::ForDate(1, 31), &conn).unwrap().is_empty());
        assert_eq!(
            query_entries(EntryQuery::ForDateRange(1, 15, 25), &conn).unwrap().len(),
            2
        );
        assert_eq!(
            query_entries(EntryQuery::ByName(1, "B".to_owned()), &conn).unwrap().len(),
            1
        );
    }

    #[test]
    fn delete_for_fish_leaves_other_fish() {
        let conn = conn();
        insert_schedule_entries(
            &[
                entry(1, "A", 1, 2, "7:00 AM"),
                entry(1, "B", 3, 4, "7:00 AM"),
                entry(2, "A", 1, 2, "7:00 AM"),
            ],
            &conn,
        )
        .unwrap();
        assert_eq!(delete_entries_for_fish(1, &conn).unwrap(), 2);
        assert_eq!(query_entries(EntryQuery::All, &conn).unwrap()[0].fish_id, 2);
    }
}
