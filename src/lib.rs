//! Feeding schedules for aquaculture ponds.
//!
//! Fish populations and their per-time-of-day feeding schedules live in a
//! local SQLite database. Schedules are grouped by fish, name and date
//! range, kept free of overlaps per fish, and sent to the pond's feeder as
//! plain text messages.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod schedule;
pub mod service;
pub mod store;
pub mod types;

pub use error::{Error, Result};
