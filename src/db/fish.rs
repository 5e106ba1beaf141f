/// Fish database queries.
use anyhow::Result;
use chrono::{DateTime, Local};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};

use crate::types::{Fish, FishId, FishQuery, NewFish};

const FISH_COLUMNS: &str = "id, name, total_count, alive_count, dead_count, average_length, \
     average_width, average_weight, feed_per_fish, date_added, last_updated, notes, phone_number";

pub fn insert_fish(arg: &NewFish, now: DateTime<Local>, conn: &Connection) -> Result<FishId> {
    let alive = arg
        .alive_count
        .unwrap_or(arg.total_count.saturating_sub(arg.dead_count));
    conn.execute(
        "INSERT INTO fish (name, total_count, alive_count, dead_count, average_length,
             average_width, average_weight, feed_per_fish, date_added, last_updated, notes,
             phone_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            arg.name,
            arg.total_count,
            alive,
            arg.dead_count,
            arg.average_length,
            arg.average_width,
            arg.average_weight,
            arg.feed_per_fish,
            now.to_rfc3339(),
            now.to_rfc3339(),
            arg.notes,
            arg.phone_number,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Writes every field of `fish`; returns the number of rows touched.
pub fn update_fish(fish: &Fish, conn: &Connection) -> Result<usize> {
    let id = fish
        .id
        .ok_or_else(|| anyhow::anyhow!("cannot update fish '{}' without an id", fish.name))?;
    let changed = conn.execute(
        "UPDATE fish SET name = ?1, total_count = ?2, alive_count = ?3, dead_count = ?4,
             average_length = ?5, average_width = ?6, average_weight = ?7, feed_per_fish = ?8,
             date_added = ?9, last_updated = ?10, notes = ?11, phone_number = ?12
         WHERE id = ?13",
        rusqlite::params![
            fish.name,
            fish.total_count,
            fish.alive_count,
            fish.dead_count,
            fish.average_length,
            fish.average_width,
            fish.average_weight,
            fish.feed_per_fish,
            fish.date_added.to_rfc3339(),
            fish.last_updated.to_rfc3339(),
            fish.notes,
            fish.phone_number,
            id,
        ],
    )?;
    Ok(changed)
}

pub fn query_fish(query: FishQuery, conn: &Connection) -> Result<Vec<Fish>> {
    match query {
        FishQuery::All => query_all_fish(conn),
        FishQuery::ById(id) => query_fish_by_id(id, conn).map(|opt| opt.into_iter().collect()),
        FishQuery::ByName(name) => {
            query_fish_by_name(&name, conn).map(|opt| opt.into_iter().collect())
        }
    }
}

pub fn query_all_fish(conn: &Connection) -> Result<Vec<Fish>> {
    let mut stmt = conn.prepare(&format!("SELECT {FISH_COLUMNS} FROM fish ORDER BY id"))?;
    let rows = stmt.query_map([], row_to_fish)?;
    let mut fish = Vec::new();
    for row in rows {
        fish.push(row?);
    }
    Ok(fish)
}

pub fn query_fish_by_id(id: FishId, conn: &Connection) -> Result<Option<Fish>> {
    let mut stmt = conn.prepare(&format!("SELECT {FISH_COLUMNS} FROM fish WHERE id = ?1"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(row_to_fish(row)?))
    } else {
        Ok(None)
    }
}

/// First fish with this name, ignoring case.
pub fn query_fish_by_name(name: &str, conn: &Connection) -> Result<Option<Fish>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FISH_COLUMNS} FROM fish WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1"
    ))?;
    let mut rows = stmt.query([name])?;
    if let Some(row) = rows.next()? {
        Ok(Some(row_to_fish(row)?))
    } else {
        Ok(None)
    }
}

pub fn check_fish_exists(name: &str, conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM fish WHERE name = ?1 COLLATE NOCASE")?;
    let count: i64 = stmt.query_row([name.trim()], |row| row.get(0))?;
    Ok(count > 0)
}

pub fn delete_fish(id: FishId, conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM fish WHERE id = ?1", [id])?)
}

pub fn delete_all_fish(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM fish", [])?)
}

fn row_to_fish(row: &Row<'_>) -> rusqlite::Result<Fish> {
    Ok(Fish {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        total_count: row.get(2)?,
        alive_count: row.get(3)?,
        dead_count: row.get(4)?,
        average_length: row.get(5)?,
        average_width: row.get(6)?,
        average_weight: row.get(7)?,
        feed_per_fish: row.get(8)?,
        date_added: parse_timestamp(row, 9)?,
        last_updated: parse_timestamp(row, 10)?,
        notes: row.get(11)?,
        phone_number: row.get(12)?,
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        delete_all_fish(&conn).unwrap();
        conn
    }

    fn new_fish(name: &str) -> NewFish {
        NewFish {
            name: name.to_owned(),
            total_count: 100,
            dead_count: 4,
            feed_per_fish: 2.5,
            phone_number: Some("+639171234567".to_owned()),
            ..NewFish::default()
        }
    }

    #[test]
    fn insert_derives_alive_count() {
        let conn = conn();
        let id = insert_fish(&new_fish("Tilapia"), Local::now(), &conn).unwrap();
        let fish = query_fish_by_id(id, &conn).unwrap().unwrap();
        assert_eq!(fish.alive_count, 96);
        assert_eq!(fish.phone_number.as_deref(), Some("+639171234567"));
        assert_eq!(fish.total_feed_amount(), 240.0);
    }

    #[test]
    fn query_by_name_and_missing() {
        let conn = conn();
        insert_fish(&new_fish("Bangus"), Local::now(), &conn).unwrap();
        assert!(query_fish_by_name("Bangus", &conn).unwrap().is_some());
        assert!(query_fish_by_name("BANGUS", &conn).unwrap().is_some());
        assert!(query_fish_by_name("Carp", &conn).unwrap().is_none());
        assert!(check_fish_exists("bangus", &conn).unwrap());
        assert!(!check_fish_exists("carp", &conn).unwrap());
    }

    #[test]
    fn update_round_trips_fields() {
        let conn = conn();
        let id = insert_fish(&new_fish("Tilapia"), Local::now(), &conn).unwrap();
        let mut fish = query_fish_by_id(id, &conn).unwrap().unwrap();
        fish.dead_count = 10;
        fish.alive_count = 90;
        fish.notes = "pond 3".to_owned();
        fish.phone_number = None;
        assert_eq!(update_fish(&fish, &conn).unwrap(), 1);
        let stored = query_fish_by_id(id, &conn).unwrap().unwrap();
        assert_eq!(stored.alive_count, 90);
        assert_eq!(stored.notes, "pond 3");
        assert_eq!(stored.phone_number, None);
    }

    #[test]
    fn delete_single_and_all() {
        let conn = conn();
        let a = insert_fish(&new_fish("A"), Local::now(), &conn).unwrap();
        insert_fish(&new_fish("B"), Local::now(), &conn).unwrap();
        assert_eq!(delete_fish(a, &conn).unwrap(), 1);
        assert_eq!(query_fish(FishQuery::All, &conn).unwrap().len(), 1);
        assert_eq!(delete_all_fish(&conn).unwrap(), 1);
        assert!(query_all_fish(&conn).unwrap().is_empty());
    }
}
