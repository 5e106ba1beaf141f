/// Database module with fish and feeding schedule queries and migrations.
mod fish;
mod migrations;
mod schedule;

use std::path::{Path, PathBuf};

use anyhow::Result;
use rusqlite::Connection;

// Re-export all public functions
pub use fish::{
    check_fish_exists, delete_all_fish, delete_fish, insert_fish, query_all_fish, query_fish,
    query_fish_by_id, query_fish_by_name, update_fish,
};
pub use migrations::{CURRENT_SCHEMA_VERSION, read_schema_version, run_migrations};
pub use schedule::{
    delete_all_entries, delete_entries_for_fish, delete_entries_matching,
    delete_entries_with_invalid_fish, insert_schedule_entries, query_entries,
    query_entries_for_fish, remove_duplicate_entries,
};

/// Opens (or creates) the SQLite database and runs migrations.
pub fn init(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Opens a private in-memory database with the full schema.
pub fn init_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Returns the default database path inside the user's data directory.
/// Falls back to `./aquafeed.db` when no data dir is found.
pub fn default_db_path() -> PathBuf {
    match dirs::data_local_dir() {
        Some(data_dir) => data_dir.join("aquafeed").join("aquafeed.db"),
        None => PathBuf::from("aquafeed.db"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("aquafeed.db");
        let conn = init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(
            read_schema_version(&conn).unwrap(),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn reopening_keeps_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("aquafeed.db");
        {
            let conn = init(&path).unwrap();
            delete_all_fish(&conn).unwrap();
        }
        let conn = init(&path).unwrap();
        assert!(query_all_fish(&conn).unwrap().is_empty());
    }
}
