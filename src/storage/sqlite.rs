//! SQLite result sink
//!
//! This module provides a SQLite-based implementation of the ResultSink trait.

use crate::source::Record;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PersistError, ResultSink};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// SQLite-backed result sink
///
/// Each call to `persist` writes one `harvests` row and its records inside a
/// single transaction, and returns a locator of the form
/// `sqlite:<path>#harvest=<id>`.
pub struct SqliteResultSink {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteResultSink {
    /// Opens (or creates) the results database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteResultSink)` - Successfully opened/created database
    /// * `Err(PersistError)` - Failed to open database
    pub fn open(path: &Path) -> Result<Self, PersistError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            location: path.display().to_string(),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, PersistError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
        })
    }

    /// Builds the locator for a harvest id
    pub fn locator(&self, harvest_id: i64) -> String {
        format!("sqlite:{}#harvest={}", self.location, harvest_id)
    }

    /// Writes one harvest and returns its id
    pub fn write_harvest(&self, keyword: &str, records: &[Record]) -> Result<i64, PersistError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO harvests (keyword, record_count, created_at) VALUES (?1, ?2, ?3)",
            params![keyword, records.len() as i64, Utc::now().to_rfc3339()],
        )?;
        let harvest_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO harvest_records (harvest_id, position, item_number, data)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, record) in records.iter().enumerate() {
                let data = serde_json::to_string(record)?;
                stmt.execute(params![
                    harvest_id,
                    position as i64,
                    record.non_empty("item_number"),
                    data
                ])?;
            }
        }

        tx.commit()?;
        Ok(harvest_id)
    }

    /// Loads the records of a harvest in their original order
    pub fn load_records(&self, harvest_id: i64) -> Result<Vec<Record>, PersistError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT data FROM harvest_records WHERE harvest_id = ?1 ORDER BY position",
        )?;

        let rows = stmt.query_map(params![harvest_id], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for data in rows {
            records.push(serde_json::from_str(&data?)?);
        }
        Ok(records)
    }

    /// Counts the persisted harvests for a keyword
    pub fn count_harvests(&self, keyword: &str) -> Result<u64, PersistError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM harvests WHERE keyword = ?1",
            params![keyword],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ResultSink for SqliteResultSink {
    async fn persist(&self, keyword: &str, records: &[Record]) -> Result<String, PersistError> {
        let harvest_id = self.write_harvest(keyword, records)?;
        tracing::info!(
            "Persisted {} record(s) for '{}' as harvest {}",
            records.len(),
            keyword,
            harvest_id
        );
        Ok(self.locator(harvest_id))
    }
}
