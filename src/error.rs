//! Error types for aquafeed.

use crate::schedule::{DateRange, GroupKey};

/// Top-level error type for the feeding schedule core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected input; nothing was written.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The requested date range shares at least one day with an existing group.
    #[error("date range {requested} overlaps existing schedule '{}' ({})", .existing.schedule_name, .existing.range())]
    Overlap {
        requested: DateRange,
        existing: GroupKey,
    },

    /// Stored data that cannot be interpreted, e.g. an unparseable feeding time.
    #[error("data integrity error: {0}")]
    Integrity(String),

    /// Database read or write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The write pool has shut down before the job could run.
    #[error("write worker unavailable")]
    WorkerUnavailable,

    #[error("config error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(err) => Error::Persistence(format!("{err:#}")),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, Error>;
