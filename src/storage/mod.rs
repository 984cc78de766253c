//! Storage module for persisting harvested records
//!
//! This module handles:
//! - The [`ResultSink`] collaborator used by the pagination driver
//! - SQLite database initialization and schema management
//! - Writing each harvest and its records transactionally

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteResultSink;
pub use traits::{PersistError, ResultSink};

use std::path::Path;

/// Opens a SQLite result sink at `path`
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteResultSink)` - Successfully initialized storage
/// * `Err(PersistError)` - Failed to initialize storage
pub fn open_sink(path: &Path) -> Result<SqliteResultSink, PersistError> {
    SqliteResultSink::open(path)
}
