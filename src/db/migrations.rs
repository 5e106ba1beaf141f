/// Database migrations, schema management and first-run seed data.
use anyhow::Result;
use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::db::fish::insert_fish;
use crate::types::NewFish;

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Fish every fresh database starts with.
const DEFAULT_FISH: &[&str] = &["Bangus", "Tilapia"];

/// Creates the schema if it doesn't exist yet and seeds a fresh database.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let fresh = !table_exists(conn, "fish")?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fish (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            name           TEXT    NOT NULL,
            total_count    INTEGER NOT NULL DEFAULT 0,
            alive_count    INTEGER NOT NULL DEFAULT 0,
            dead_count     INTEGER NOT NULL DEFAULT 0,
            average_length REAL    NOT NULL DEFAULT 0,
            average_width  REAL    NOT NULL DEFAULT 0,
            average_weight REAL    NOT NULL DEFAULT 0,
            feed_per_fish  REAL    NOT NULL DEFAULT 0,
            date_added     TEXT    NOT NULL,
            last_updated   TEXT    NOT NULL,
            notes          TEXT    NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS feeding_schedules (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            fish_id       INTEGER NOT NULL,
            schedule_name TEXT    NOT NULL,
            start_date    INTEGER NOT NULL,
            end_date      INTEGER NOT NULL,
            feeding_time  TEXT    NOT NULL,
            feed_quantity REAL    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_schedules_group
            ON feeding_schedules(fish_id, schedule_name, start_date, end_date);
        ",
    )?;
    migrate_fish_add_phone_number(conn)?;
    write_schema_version(conn, CURRENT_SCHEMA_VERSION)?;

    if fresh {
        seed_default_fish(conn)?;
    }
    Ok(())
}

/// Reads the schema version stamp, `None` before the first migration.
pub fn read_schema_version(conn: &Connection) -> Result<Option<u32>> {
    if !table_exists(conn, "schema_meta")? {
        return Ok(None);
    }
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|v| v.parse().ok()))
}

fn write_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [version.to_string()],
    )?;
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let mut stmt =
        conn.prepare("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let count: i64 = stmt.query_row([table], |row| row.get(0))?;
    Ok(count > 0)
}

// Version 1 databases predate outbound notifications.
fn migrate_fish_add_phone_number(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(fish)")?;
    let rows = stmt.query_map([], |row| {
        let name: String = row.get(1)?;
        Ok(name)
    })?;
    for row in rows {
        if row? == "phone_number" {
            return Ok(());
        }
    }

    conn.execute("ALTER TABLE fish ADD COLUMN phone_number TEXT", [])?;
    Ok(())
}

fn seed_default_fish(conn: &Connection) -> Result<()> {
    let now = Local::now();
    for name in DEFAULT_FISH {
        insert_fish(
            &NewFish {
                name: (*name).to_owned(),
                ..NewFish::default()
            },
            now,
            conn,
        )?;
    }
    info!(count = DEFAULT_FISH.len(), "seeded default fish");
    Ok(())
}
