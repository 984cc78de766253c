//! Keyword Harvester: a resilient keyword-driven page harvester
//!
//! This crate runs multi-page collection jobs against a rate-limited content
//! source. Each job walks a bounded page sequence for one keyword, shares
//! per-endpoint token buckets with every other running job, retries transient
//! failures with exponential backoff, re-runs failed jobs on an escalating
//! schedule and records jobs that never succeed in a durable dead-letter queue.
//! Observers can follow any job through a progress fan-out hub.

pub mod cache;
pub mod config;
pub mod engine;
pub mod jobs;
pub mod limiter;
pub mod pagination;
pub mod progress;
pub mod recovery;
pub mod retry;
pub mod source;
pub mod storage;

use thiserror::Error;
use uuid::Uuid;

use crate::jobs::JobStatus;
use crate::recovery::DeadLetterError;
use crate::retry::RetryError;
use crate::source::{ExtractionError, FetchError};
use crate::storage::PersistError;

/// Main error type for Keyword Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A page fetch failed with an error that retrying cannot fix
    #[error("{cause}: non-retryable")]
    NonRetryable { cause: String },

    /// A page fetch kept failing until the retry budget ran out
    #[error("exhausted {attempts} retries: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Every recovery re-run of a job failed
    #[error("recovery exhausted after {attempts} attempts: {last_error}")]
    RecoveryExhausted { attempts: u32, last_error: String },

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Persist failed: {0}")]
    Persist(#[from] PersistError),

    #[error("Dead-letter queue error: {0}")]
    DeadLetter(#[from] DeadLetterError),

    #[error("Invalid keyword: {0}")]
    InvalidKeyword(String),

    #[error("Invalid page budget {requested}: must be between 1 and {limit}")]
    InvalidPageBudget { requested: u32, limit: u32 },

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl HarvestError {
    /// Returns true if re-running the whole job may succeed
    ///
    /// Exhausted fetch retries and persistence failures are worth a recovery
    /// pass. Client errors, bad input and cancellation are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::Persist(_))
    }
}

impl From<RetryError<FetchError>> for HarvestError {
    fn from(err: RetryError<FetchError>) -> Self {
        match err {
            RetryError::Fatal {
                last: FetchError::Cancelled,
                ..
            } => Self::Cancelled,
            RetryError::Fatal { last, .. } => Self::NonRetryable {
                cause: last.to_string(),
            },
            RetryError::FatalStatus { status, .. } => Self::NonRetryable {
                cause: format!("HTTP {}", status),
            },
            RetryError::Exhausted { attempts, last } => Self::RetriesExhausted {
                attempts,
                last_error: last.to_string(),
            },
            RetryError::StatusExhausted { attempts, status } => Self::RetriesExhausted {
                attempts,
                last_error: format!("HTTP {}", status),
            },
            RetryError::Cancelled { .. } => Self::Cancelled,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Keyword Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use engine::Engine;
pub use jobs::{Job, JobStore};
pub use pagination::{PaginationDriver, PaginationOutcome};
pub use recovery::{DeadLetterQueue, FailedJobRecord, RecoveryManager};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_message_names_status() {
        let err = HarvestError::from(RetryError::Fatal {
            attempts: 1,
            last: FetchError::Client(404),
        });
        assert_eq!(err.to_string(), "HTTP 404: non-retryable");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_exhausted_message_names_cause() {
        let err = HarvestError::from(RetryError::Exhausted {
            attempts: 3,
            last: FetchError::Transient("connection timeout".to_string()),
        });
        assert_eq!(err.to_string(), "exhausted 3 retries: connection timeout");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_status_exhausted_is_recoverable() {
        let err = HarvestError::from(RetryError::<FetchError>::StatusExhausted {
            attempts: 4,
            status: 503,
        });
        assert_eq!(err.to_string(), "exhausted 4 retries: HTTP 503");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_cancelled_fetch_maps_to_cancelled() {
        let err = HarvestError::from(RetryError::Fatal {
            attempts: 1,
            last: FetchError::Cancelled,
        });
        assert!(matches!(err, HarvestError::Cancelled));
    }

    #[test]
    fn test_cancelled_is_not_recoverable() {
        let err = HarvestError::from(RetryError::<FetchError>::Cancelled { attempts: 2 });
        assert!(matches!(err, HarvestError::Cancelled));
        assert!(!err.is_recoverable());
    }
}
