//! Content source collaborators
//!
//! The pagination loop talks to the outside world through three traits:
//! - [`PageFetcher`] fetches the raw content of one result page
//! - [`RecordExtractor`] turns raw content into records and a "more pages" signal
//! - [`RecordValidator`] validates and de-duplicates the collected records
//!
//! Default implementations live in the submodules: an HTTP fetcher built on
//! reqwest, an HTML listing extractor built on scraper, and a field validator.

mod extractor;
mod fetcher;
mod validator;

pub use extractor::HtmlListingExtractor;
pub use fetcher::{build_http_client, HttpPageFetcher};
pub use validator::ListingValidator;

use crate::retry::{classify_status, Classification, Classify, ResponseStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// One extracted record, a flat map of field name to value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, String>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Returns the field value if it is present and not blank
    pub fn non_empty(&self, field: &str) -> Option<&str> {
        self.get(field).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fraction of fields holding a non-blank value, 0.0 for an empty record
    pub fn completeness(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        let filled = self.0.values().filter(|v| !v.trim().is_empty()).count();
        filled as f64 / self.0.len() as f64
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Raw content of one fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    /// Status reported by the source for this page
    pub status: u16,

    pub content: String,
}

impl RawPage {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            status: 200,
            content: content.into(),
        }
    }
}

impl ResponseStatus for RawPage {
    fn status_code(&self) -> Option<u16> {
        Some(self.status)
    }
}

/// Failure fetching one page
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Timeout, connection reset or similar network failure
    #[error("{0}")]
    Transient(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP {0}")]
    Server(u16),

    #[error("HTTP {0}")]
    Client(u16),

    /// The source answered but the response could not be understood
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The job was cancelled while waiting to fetch
    #[error("cancelled")]
    Cancelled,
}

impl Classify for FetchError {
    fn classify(&self) -> Classification {
        match self {
            FetchError::Transient(_) => Classification::retryable(),
            FetchError::RateLimited { retry_after } => Classification::Retryable {
                retry_after: *retry_after,
            },
            FetchError::Server(code) => {
                classify_status(*code).unwrap_or(Classification::Fatal)
            }
            FetchError::Client(_) | FetchError::Malformed(_) | FetchError::Cancelled => {
                Classification::Fatal
            }
        }
    }
}

/// Failure turning raw content into records
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    #[error("unexpected content: {0}")]
    UnexpectedContent(String),

    #[error("invalid selector '{0}'")]
    Selector(String),
}

/// Records and continuation signal extracted from one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub has_more_pages: bool,
}

/// Outcome of validating and de-duplicating a harvest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Records submitted for validation
    pub total: usize,

    /// Valid records with duplicates removed
    pub valid_records: Vec<Record>,

    /// Number of records that failed validation
    pub invalid: usize,

    pub errors: Vec<String>,

    /// Share of submitted records that passed validation
    pub valid_ratio: f64,

    /// Average field completeness of the valid records
    pub avg_completeness: f64,
}

/// Fetches the raw content of one result page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches page `page` (one-based) of the results for `keyword`
    async fn fetch_page(&self, keyword: &str, page: u32) -> Result<RawPage, FetchError>;
}

/// Extracts records from raw page content
pub trait RecordExtractor: Send + Sync {
    fn extract(&self, page: &RawPage) -> Result<Extraction, ExtractionError>;
}

/// Validates and de-duplicates collected records
pub trait RecordValidator: Send + Sync {
    fn validate_and_dedupe(&self, records: Vec<Record>) -> ValidationReport;
}
