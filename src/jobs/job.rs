use crate::config::JobsConfig;
use crate::jobs::JobStatus;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A validated request to start a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub keyword: String,
    pub max_pages: u32,
}

impl JobSpec {
    /// Validates a job request against the configured limits
    ///
    /// The keyword is trimmed; it must then be non-empty and no longer than
    /// `max_keyword_length` characters. `max_pages` must be between 1 and
    /// `max_pages_limit`.
    pub fn validated(keyword: &str, max_pages: u32, limits: &JobsConfig) -> Result<Self, HarvestError> {
        let keyword = keyword.trim();

        if keyword.is_empty() {
            return Err(HarvestError::InvalidKeyword(
                "keyword cannot be empty".to_string(),
            ));
        }

        let length = keyword.chars().count();
        if length > limits.max_keyword_length {
            return Err(HarvestError::InvalidKeyword(format!(
                "keyword is {} characters, limit is {}",
                length, limits.max_keyword_length
            )));
        }

        if max_pages < 1 || max_pages > limits.max_pages_limit {
            return Err(HarvestError::InvalidPageBudget {
                requested: max_pages,
                limit: limits.max_pages_limit,
            });
        }

        Ok(Self {
            keyword: keyword.to_string(),
            max_pages,
        })
    }
}

/// Summary attached to a job once it reaches a terminal status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobResults {
    pub keyword: String,

    /// Validated records kept
    pub records_count: usize,

    /// Where the records were persisted
    pub locator: Option<String>,

    pub pages_scraped: u32,

    /// Records collected before validation
    pub total_found: usize,

    pub valid_records: usize,

    pub quality_score: f64,

    /// Served from the response cache
    pub from_cache: bool,

    /// Succeeded only after a recovery re-run
    pub recovered: bool,

    pub dead_lettered: bool,

    pub error: Option<String>,
}

/// One orchestration run for a keyword
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub keyword: String,
    pub max_pages: u32,
    pub status: JobStatus,

    /// Percentage complete, 0 to 100
    pub progress: u8,

    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub results: Option<JobResults>,
}

impl Job {
    /// Creates a pending job from a validated [`JobSpec`]
    pub fn new(spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            message: format!("Queued keyword search for '{}'", spec.keyword),
            keyword: spec.keyword,
            max_pages: spec.max_pages,
            status: JobStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            results: None,
        }
    }
}
