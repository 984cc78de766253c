//! Durable dead-letter queue
//!
//! The queue is a JSON array of failed-job records kept in one file. It is
//! loaded when opened and rewritten in full after every mutation, through a
//! temporary file and a rename so that a crash mid-write never leaves a
//! truncated queue behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

/// Errors reading or writing the dead-letter file
#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed dead-letter file {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A job that exhausted every retry and recovery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJobRecord {
    pub job_id: Uuid,
    pub keyword: String,
    pub error: String,
    pub attempt_count: u32,
    pub last_attempt: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// File-backed list of permanently failed jobs
#[derive(Debug)]
pub struct DeadLetterQueue {
    path: PathBuf,
    records: Mutex<Vec<FailedJobRecord>>,
}

impl DeadLetterQueue {
    /// Opens the queue stored at `path`
    ///
    /// A missing file is an empty queue. A file that exists but cannot be
    /// parsed is an error, so that a damaged queue is never overwritten.
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the JSON queue file
    ///
    /// # Returns
    ///
    /// * `Ok(DeadLetterQueue)` - The loaded queue
    /// * `Err(DeadLetterError)` - The file could not be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DeadLetterError> {
        let path = path.into();

        let records = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| {
                DeadLetterError::Serialization {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(DeadLetterError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        if !records.is_empty() {
            tracing::info!(
                "Loaded {} record(s) from dead-letter queue {}",
                records.len(),
                path.display()
            );
        }

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a failed job and persists the queue
    ///
    /// The record stays in memory even if writing the file fails; the error
    /// is returned so the caller can report it.
    pub fn add(
        &self,
        job_id: Uuid,
        keyword: &str,
        error: &str,
        attempt_count: u32,
    ) -> Result<FailedJobRecord, DeadLetterError> {
        let now = Utc::now();
        let record = FailedJobRecord {
            job_id,
            keyword: keyword.to_string(),
            error: error.to_string(),
            attempt_count,
            last_attempt: now,
            created_at: now,
            next_retry_at: None,
        };

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push(record.clone());

        tracing::warn!(
            "Added job {} ('{}') to dead-letter queue after {} attempt(s): {}",
            job_id,
            keyword,
            attempt_count,
            error
        );

        self.save(&records)?;
        Ok(record)
    }

    /// Returns a copy of every record
    pub fn get_all(&self) -> Vec<FailedJobRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the most recent record for `job_id`
    pub fn get(&self, job_id: Uuid) -> Option<FailedJobRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.iter().rev().find(|r| r.job_id == job_id).cloned()
    }

    /// Removes every record for `job_id`
    ///
    /// Removing an id that is not queued is a no-op and does not touch the
    /// file.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - At least one record was removed
    /// * `Ok(false)` - No record had that id
    pub fn remove(&self, job_id: Uuid) -> Result<bool, DeadLetterError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|r| r.job_id != job_id);

        if records.len() == before {
            return Ok(false);
        }

        tracing::info!("Removed job {} from dead-letter queue", job_id);
        self.save(&records)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save(&self, records: &[FailedJobRecord]) -> Result<(), DeadLetterError> {
        let io_error = |source| DeadLetterError::Io {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(records).map_err(|source| {
            DeadLetterError::Serialization {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json).map_err(io_error)?;
        std::fs::rename(&tmp, &self.path).map_err(io_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn queue_in(dir: &TempDir) -> DeadLetterQueue {
        DeadLetterQueue::open(dir.path().join("dead_letter_queue.json")).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty_queue() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        assert!(queue.is_empty());
        assert!(!queue.path().exists());
    }

    #[test]
    fn test_add_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let job_id = Uuid::new_v4();

        {
            let queue = queue_in(&dir);
            queue.add(job_id, "desk lamp", "exhausted 4 retries: HTTP 503", 3).unwrap();
        }

        let reopened = queue_in(&dir);
        let records = reopened.get_all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].job_id, job_id);
        assert_eq!(records[0].attempt_count, 3);
        assert_eq!(records[0].keyword, "desk lamp");
    }

    #[test]
    fn test_file_format() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue.add(Uuid::new_v4(), "lamp", "boom", 3).unwrap();

        let content = std::fs::read_to_string(queue.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        let entry = &value.as_array().unwrap()[0];

        for field in ["job_id", "keyword", "error", "attempt_count", "last_attempt", "created_at"] {
            assert!(entry.get(field).is_some(), "missing field {}", field);
        }
        assert!(entry.get("next_retry_at").is_none());
        assert!(DateTime::parse_from_rfc3339(entry["created_at"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        let job_id = Uuid::new_v4();
        queue.add(job_id, "lamp", "boom", 3).unwrap();

        assert!(queue.remove(job_id).unwrap());
        assert!(!queue.remove(job_id).unwrap());
        assert!(queue.is_empty());
        assert!(queue_in(&dir).is_empty());
    }

    #[test]
    fn test_get_all_is_a_copy() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue.add(Uuid::new_v4(), "lamp", "boom", 3).unwrap();

        let mut snapshot = queue.get_all();
        snapshot.clear();

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_get_by_id() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        let job_id = Uuid::new_v4();
        queue.add(job_id, "lamp", "boom", 3).unwrap();

        assert_eq!(queue.get(job_id).unwrap().error, "boom");
        assert!(queue.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dead_letter_queue.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = DeadLetterQueue::open(&path);
        assert!(matches!(result, Err(DeadLetterError::Serialization { .. })));
    }

    #[test]
    fn test_failed_save_keeps_record_in_memory() {
        let dir = TempDir::new().unwrap();
        // The queue path is a directory, so the final rename fails.
        let path = dir.path().join("queue");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();

        let queue = DeadLetterQueue {
            path: path.clone(),
            records: Mutex::new(Vec::new()),
        };

        assert!(queue.add(Uuid::new_v4(), "lamp", "boom", 3).is_err());
        assert_eq!(queue.len(), 1);
    }
}
