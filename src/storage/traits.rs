//! Result sink trait and error types

use crate::source::Record;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while persisting records
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for validated harvest records
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persists the records of one harvest
    ///
    /// # Arguments
    ///
    /// * `keyword` - The keyword the records were harvested for
    /// * `records` - Validated, de-duplicated records
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - A locator identifying where the records were written
    /// * `Err(PersistError)` - The records could not be written
    async fn persist(&self, keyword: &str, records: &[Record]) -> Result<String, PersistError>;
}
