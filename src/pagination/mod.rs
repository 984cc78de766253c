//! Pagination-driven harvesting
//!
//! The [`PaginationDriver`] walks a bounded page sequence for one keyword,
//! using the rate limiter and retrier around every fetch and the response
//! cache to skip repeated work.

mod driver;

pub use driver::{page_progress, PaginationDriver, START_PROGRESS};

use crate::cache::CacheEntry;
use crate::source::Record;
use crate::HarvestError;

/// Why the pagination loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every page in the budget was fetched
    BudgetExhausted,

    /// A page produced no records
    EmptyPage,

    /// A page reported that no further pages exist
    NoMorePages,

    /// A page could not be turned into records; earlier pages are kept
    ExtractionFailed,

    /// A page fetch failed after retries
    FetchFailed,

    Cancelled,

    /// The result came from the response cache
    Cached,

    /// The keyword or page budget was rejected
    InvalidInput,

    /// Validated records could not be persisted
    PersistFailed,
}

/// Result of one pagination run
#[derive(Debug)]
pub struct PaginationOutcome {
    pub success: bool,

    /// Validated records on success; records collected so far on failure
    pub records: Vec<Record>,

    pub pages_scraped: u32,

    /// Records collected before validation
    pub total_found: usize,

    pub valid_records: usize,
    pub quality_score: f64,

    /// Where the records were persisted, if a sink is configured
    pub locator: Option<String>,

    pub from_cache: bool,
    pub stop_reason: StopReason,
    pub error: Option<HarvestError>,
}

impl PaginationOutcome {
    /// Builds a successful outcome from a cache entry
    pub fn from_cache(entry: CacheEntry) -> Self {
        Self {
            success: true,
            valid_records: entry.records.len(),
            records: entry.records,
            pages_scraped: entry.pages_scraped,
            total_found: entry.total_found,
            quality_score: entry.quality_score,
            locator: entry.locator,
            from_cache: true,
            stop_reason: StopReason::Cached,
            error: None,
        }
    }

    /// Converts the outcome into a `Result`, keeping the failure cause
    pub fn into_result(self) -> Result<PaginationOutcome, HarvestError> {
        match self.error {
            Some(error) if !self.success => Err(error),
            _ => Ok(self),
        }
    }
}

/// Combines validity and completeness into one score
///
/// `0.7 * valid_ratio + 0.3 * avg_completeness`, rounded to three decimals.
pub fn quality_score(valid_ratio: f64, avg_completeness: f64) -> f64 {
    let score = 0.7 * valid_ratio + 0.3 * avg_completeness;
    (score * 1000.0).round() / 1000.0
}
