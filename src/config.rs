//! Start-up configuration.
//!
//! Sources, highest priority first: command line flags, `AQUAFEED_*`
//! environment variables (both handled by clap), the TOML file at
//! `<config dir>/aquafeed/config.toml`, then built-in defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::db;
use crate::error::{Error, Result};
use crate::store::{DEFAULT_WORKERS, MAX_WORKERS};

const DEFAULT_LOG_FILTER: &str = "info";

/// Settings read from the TOML file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database_path: Option<PathBuf>,
    pub write_workers: Option<usize>,
    pub log_filter: Option<String>,
    pub notifications_enabled: Option<bool>,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub write_workers: Option<usize>,
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: PathBuf,
    /// Always within `1..=MAX_WORKERS`.
    pub write_workers: usize,
    pub log_filter: String,
    /// When off the console transport reports permission denied.
    pub notifications_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: db::default_db_path(),
            write_workers: DEFAULT_WORKERS,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            notifications_enabled: true,
        }
    }
}

impl Config {
    /// Load the default config file (if any) and apply `overrides`.
    pub fn load(overrides: Overrides) -> Result<Self> {
        let file = match default_config_path() {
            Some(path) if path.exists() => read_file(&path)?,
            _ => FileConfig::default(),
        };
        Ok(Self::resolve(file, overrides))
    }

    pub fn resolve(file: FileConfig, overrides: Overrides) -> Self {
        let defaults = Self::default();
        Self {
            database_path: overrides
                .database_path
                .or(file.database_path)
                .unwrap_or(defaults.database_path),
            write_workers: overrides
                .write_workers
                .or(file.write_workers)
                .unwrap_or(defaults.write_workers)
                .clamp(1, MAX_WORKERS),
            log_filter: overrides
                .log_filter
                .or(file.log_filter)
                .unwrap_or(defaults.log_filter),
            notifications_enabled: file
                .notifications_enabled
                .unwrap_or(defaults.notifications_enabled),
        }
    }
}

pub fn read_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    let file: FileConfig = toml::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;
    debug!(path = %path.display(), "loaded config file");
    Ok(file)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("aquafeed").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_beat_file_beat_defaults() {
        let file = FileConfig {
            database_path: Some(PathBuf::from("/srv/file.db")),
            write_workers: Some(2),
            log_filter: Some("debug".to_owned()),
            notifications_enabled: Some(false),
        };
        let overrides = Overrides {
            database_path: Some(PathBuf::from("/tmp/cli.db")),
            ..Overrides::default()
        };
        let config = Config::resolve(file, overrides);
        assert_eq!(config.database_path, PathBuf::from("/tmp/cli.db"));
        assert_eq!(config.write_workers, 2);
        assert_eq!(config.log_filter, "debug");
        assert!(!config.notifications_enabled);
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::resolve(FileConfig::default(), Overrides::default());
        assert_eq!(config, Config::default());
        assert_eq!(config.write_workers, DEFAULT_WORKERS);
        assert!(config.database_path.ends_with("aquafeed.db"));
    }

    #[test]
    fn worker_count_is_clamped() {
        let zero = Overrides {
            write_workers: Some(0),
            ..Overrides::default()
        };
        assert_eq!(Config::resolve(FileConfig::default(), zero).write_workers, 1);
        let many = FileConfig {
            write_workers: Some(99),
            ..FileConfig::default()
        };
        assert_eq!(
            Config::resolve(many, Overrides::default()).write_workers,
            MAX_WORKERS
        );
    }

    #[test]
    fn reads_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "database_path = \"/data/feed.db\"\nwrite_workers = 3\nnotifications_enabled = false\n",
        )
        .unwrap();
        let file = read_file(&path).unwrap();
        assert_eq!(file.database_path, Some(PathBuf::from("/data/feed.db")));
        assert_eq!(file.write_workers, Some(3));
        assert_eq!(file.notifications_enabled, Some(false));
        assert_eq!(file.log_filter, None);
    }

    #[test]
    fn rejects_unknown_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "workers = 3\n").unwrap();
        assert!(matches!(read_file(&path), Err(Error::Config(_))));
    }
}
