//! Fetch, extract and accumulate loop for one keyword
//!
//! Pages are fetched strictly in sequence because whether page N+1 is needed
//! depends on what page N contained. After each page the loop stops when:
//! 1. the page budget is used up
//! 2. the fetch failed after retries (the run fails, partial records are kept)
//! 3. the page produced zero records
//! 4. the page reports that no further pages exist
//!
//! Every fetch attempt first takes a token from the shared rate limiter, so
//! all concurrently running jobs together respect the endpoint's limit.

use crate::cache::{cache_key, CacheEntry, ResponseCache};
use crate::limiter::{EndpointLimit, RateLimiter, KEYWORD_SEARCH_ENDPOINT};
use crate::pagination::{quality_score, PaginationOutcome, StopReason};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::retry::{Retrier, RetryPolicy};
use crate::source::{FetchError, PageFetcher, Record, RecordExtractor, RecordValidator};
use crate::storage::ResultSink;
use crate::HarvestError;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Progress reported before the first page
pub const START_PROGRESS: u8 = 5;

/// Runs the pagination loop for one keyword at a time
pub struct PaginationDriver {
    limiter: Arc<RateLimiter>,
    retrier: Retrier,
    policy: RetryPolicy,
    cache: Arc<ResponseCache>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn RecordExtractor>,
    validator: Arc<dyn RecordValidator>,
    sink: Option<Arc<dyn ResultSink>>,
    endpoint: String,
    limit: EndpointLimit,
    failure_notices: bool,
}

impl PaginationDriver {
    /// Creates a driver rate-limited on the keyword search endpoint
    ///
    /// # Arguments
    ///
    /// * `limiter` - Shared rate limiter
    /// * `cache` - Shared response cache
    /// * `fetcher` - Fetches raw page content
    /// * `extractor` - Turns raw content into records
    /// * `validator` - Validates and de-duplicates the collected records
    /// * `policy` - Retry policy applied to every page fetch
    pub fn new(
        limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn RecordExtractor>,
        validator: Arc<dyn RecordValidator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            limiter,
            retrier: Retrier::new(),
            policy,
            cache,
            fetcher,
            extractor,
            validator,
            sink: None,
            endpoint: KEYWORD_SEARCH_ENDPOINT.to_string(),
            limit: EndpointLimit::default(),
            failure_notices: true,
        }
    }

    /// Persists validated records through `sink` before completing
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Rate-limits page fetches on `endpoint` with `limit`
    pub fn with_endpoint(mut self, endpoint: impl Into<String>, limit: EndpointLimit) -> Self {
        self.endpoint = endpoint.into();
        self.limit = limit;
        self
    }

    /// Stops the driver from sending its 0% "Failed to scrape" update
    ///
    /// Used when the caller publishes the final failure itself and the job
    /// may still be recovered.
    pub fn without_failure_notices(mut self) -> Self {
        self.failure_notices = false;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Harvests up to `max_pages` pages for `keyword`
    ///
    /// # Arguments
    ///
    /// * `keyword` - The search keyword (trimmed before use)
    /// * `max_pages` - Page budget, at least 1
    /// * `progress` - Receives an update before every page and a final one
    /// * `cancel` - Checked before every page and during every wait
    ///
    /// # Returns
    ///
    /// A [`PaginationOutcome`]. On failure `records` holds whatever was
    /// collected before the failure and `error` names the cause.
    pub async fn run(
        &self,
        keyword: &str,
        max_pages: u32,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> PaginationOutcome {
        let keyword = keyword.trim();

        if keyword.is_empty() {
            let error = HarvestError::InvalidKeyword("keyword cannot be empty".to_string());
            return self.fail(keyword, error, StopReason::InvalidInput, Vec::new(), 0, progress).await;
        }
        if max_pages == 0 {
            let error = HarvestError::InvalidPageBudget {
                requested: 0,
                limit: u32::MAX,
            };
            return self.fail(keyword, error, StopReason::InvalidInput, Vec::new(), 0, progress).await;
        }

        let key = cache_key(keyword, max_pages);
        if let Some(entry) = self.cache.get(&key) {
            tracing::info!("Cache hit for '{}' ({} records)", keyword, entry.records.len());
            progress
                .notify(ProgressUpdate::new(
                    100,
                    format!("Loaded {} cached records for '{}'", entry.records.len(), keyword),
                ))
                .await;
            return PaginationOutcome::from_cache(entry);
        }

        let started = Instant::now();
        let mut records: Vec<Record> = Vec::new();
        let mut pages_scraped = 0;
        let mut page = 1;

        let stop = loop {
            if page > max_pages {
                break StopReason::BudgetExhausted;
            }
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            progress
                .notify(ProgressUpdate::new(
                    page_progress(page, max_pages),
                    format!("Scraping page {}/{} for '{}'", page, max_pages, keyword),
                ))
                .await;

            let limiter = &self.limiter;
            let fetcher = &self.fetcher;
            let endpoint = self.endpoint.as_str();
            let limit = self.limit;

            let fetched = self
                .retrier
                .execute(&self.policy, cancel, move |_attempt| async move {
                    limiter
                        .acquire_with_cancel(endpoint, limit, 1.0, cancel)
                        .await
                        .map_err(|_| FetchError::Cancelled)?;
                    fetcher.fetch_page(keyword, page).await
                })
                .await;

            let raw = match fetched {
                Ok(raw) => raw,
                Err(e) => {
                    let error = HarvestError::from(e);
                    let reason = if matches!(error, HarvestError::Cancelled) {
                        StopReason::Cancelled
                    } else {
                        StopReason::FetchFailed
                    };
                    tracing::warn!("Page {} for '{}' failed: {}", page, keyword, error);
                    return self
                        .fail(keyword, error, reason, records, pages_scraped, progress)
                        .await;
                }
            };

            let extraction = match self.extractor.extract(&raw) {
                Ok(extraction) => extraction,
                Err(e) => {
                    tracing::warn!(
                        "Extraction failed on page {} for '{}': {}; keeping {} record(s)",
                        page,
                        keyword,
                        e,
                        records.len()
                    );
                    break StopReason::ExtractionFailed;
                }
            };

            pages_scraped = page;
            let found = extraction.records.len();
            tracing::info!("Page {}/{} for '{}': {} record(s)", page, max_pages, keyword, found);

            if found == 0 {
                break StopReason::EmptyPage;
            }

            records.extend(extraction.records);

            if !extraction.has_more_pages {
                break StopReason::NoMorePages;
            }

            page += 1;
        };

        if stop == StopReason::Cancelled {
            return self
                .fail(keyword, HarvestError::Cancelled, stop, records, pages_scraped, progress)
                .await;
        }

        tracing::info!(
            "Stopped '{}' after {} page(s) ({:?}) in {:?}",
            keyword,
            pages_scraped,
            stop,
            started.elapsed()
        );

        self.complete(keyword, key, records, pages_scraped, stop, progress)
            .await
    }

    async fn complete(
        &self,
        keyword: &str,
        key: String,
        records: Vec<Record>,
        pages_scraped: u32,
        stop: StopReason,
        progress: &dyn ProgressSink,
    ) -> PaginationOutcome {
        let total_found = records.len();

        let (valid, score) = if records.is_empty() {
            (Vec::new(), 0.0)
        } else {
            let report = self.validator.validate_and_dedupe(records);
            let score = quality_score(report.valid_ratio, report.avg_completeness);
            (report.valid_records, score)
        };

        let mut locator = None;
        if let (Some(sink), false) = (&self.sink, valid.is_empty()) {
            match sink.persist(keyword, &valid).await {
                Ok(location) => locator = Some(location),
                Err(e) => {
                    tracing::error!("Persisting results for '{}' failed: {}", keyword, e);
                    return self
                        .fail(
                            keyword,
                            HarvestError::Persist(e),
                            StopReason::PersistFailed,
                            valid,
                            pages_scraped,
                            progress,
                        )
                        .await;
                }
            }
        }

        if !valid.is_empty() {
            self.cache.insert(CacheEntry {
                key,
                records: valid.clone(),
                locator: locator.clone(),
                pages_scraped,
                total_found,
                quality_score: score,
            });
        }

        progress
            .notify(ProgressUpdate::new(
                100,
                format!("Found {} valid records for '{}'", valid.len(), keyword),
            ))
            .await;

        PaginationOutcome {
            success: true,
            valid_records: valid.len(),
            records: valid,
            pages_scraped,
            total_found,
            quality_score: score,
            locator,
            from_cache: false,
            stop_reason: stop,
            error: None,
        }
    }

    async fn fail(
        &self,
        keyword: &str,
        error: HarvestError,
        stop: StopReason,
        records: Vec<Record>,
        pages_scraped: u32,
        progress: &dyn ProgressSink,
    ) -> PaginationOutcome {
        if self.failure_notices {
            progress
                .notify(ProgressUpdate::new(
                    0,
                    format!("Failed to scrape '{}': {}", keyword, error),
                ))
                .await;
        } else {
            tracing::debug!("Harvest of '{}' failed: {}", keyword, error);
        }

        PaginationOutcome {
            success: false,
            total_found: records.len(),
            valid_records: 0,
            records,
            pages_scraped,
            quality_score: 0.0,
            locator: None,
            from_cache: false,
            stop_reason: stop,
            error: Some(error),
        }
    }
}

/// Progress reported before fetching `page` of `max_pages`
///
/// Starts just above [`START_PROGRESS`] and never exceeds 95, leaving the
/// final step to the completion notification.
pub fn page_progress(page: u32, max_pages: u32) -> u8 {
    let max_pages = max_pages.max(1);
    let scaled = (page.saturating_sub(1) as u64 * 90) / max_pages as u64;
    (START_PROGRESS as u64 + scaled).min(95) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{FnProgress, NoopProgress};
    use crate::source::{Extraction, ExtractionError, ListingValidator, RawPage};
    use crate::storage::SqliteResultSink;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves `page-N` for every page unless a scripted response is queued
    #[derive(Default)]
    struct ScriptedFetcher {
        calls: AtomicU32,
        script: Mutex<HashMap<u32, VecDeque<Result<RawPage, FetchError>>>>,
    }

    impl ScriptedFetcher {
        fn queue(&self, page: u32, response: Result<RawPage, FetchError>, times: usize) {
            let mut script = self.script.lock().unwrap();
            let entry = script.entry(page).or_default();
            for _ in 0..times {
                entry.push_back(response.clone());
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(&self, _keyword: &str, page: u32) -> Result<RawPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let scripted = self
                .script
                .lock()
                .unwrap()
                .get_mut(&page)
                .and_then(VecDeque::pop_front);
            scripted.unwrap_or_else(|| Ok(RawPage::ok(format!("page-{}", page))))
        }
    }

    /// Maps `page-N` to a configured record count and "more pages" flag
    struct ScriptedExtractor {
        pages: HashMap<u32, (usize, bool)>,
    }

    impl ScriptedExtractor {
        fn new(pages: &[(u32, usize, bool)]) -> Self {
            Self {
                pages: pages.iter().map(|(p, n, more)| (*p, (*n, *more))).collect(),
            }
        }
    }

    impl RecordExtractor for ScriptedExtractor {
        fn extract(&self, page: &RawPage) -> Result<Extraction, ExtractionError> {
            let number: u32 = page
                .content
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| ExtractionError::UnexpectedContent(page.content.clone()))?;

            let (count, has_more_pages) = self.pages.get(&number).copied().unwrap_or((0, false));
            let records = (0..count)
                .map(|i| {
                    let item = format!("{:08}", 10_000_000 + number as usize * 100 + i);
                    Record::new()
                        .with("listing_title", format!("Listing {} on page {}", i, number))
                        .with("listings_url", format!("https://www.target.com/p/x/-/A-{}", item))
                        .with("item_number", item)
                })
                .collect();

            Ok(Extraction {
                records,
                has_more_pages,
            })
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
        )
    }

    fn create_test_driver(
        fetcher: Arc<ScriptedFetcher>,
        extractor: ScriptedExtractor,
        max_attempts: u32,
    ) -> PaginationDriver {
        PaginationDriver::new(
            Arc::new(RateLimiter::new()),
            Arc::new(ResponseCache::new(Duration::from_secs(3600), 100)),
            fetcher,
            Arc::new(extractor),
            Arc::new(ListingValidator::new()),
            fast_policy(max_attempts),
        )
        .with_endpoint("test", EndpointLimit::new(100.0, 100.0))
    }

    async fn run(driver: &PaginationDriver, keyword: &str, max_pages: u32) -> PaginationOutcome {
        driver
            .run(keyword, max_pages, &NoopProgress, &CancellationToken::new())
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_no_more_pages() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let extractor = ScriptedExtractor::new(&[(1, 5, true), (2, 3, false), (3, 4, false)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3);

        let outcome = run(&driver, "X", 3).await;

        assert!(outcome.success);
        assert_eq!(outcome.pages_scraped, 2);
        assert_eq!(outcome.total_found, 8);
        assert_eq!(outcome.stop_reason, StopReason::NoMorePages);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_record_page_stops() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let extractor = ScriptedExtractor::new(&[(1, 0, true)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3);

        let outcome = run(&driver, "X", 5).await;

        assert!(outcome.success);
        assert_eq!(outcome.pages_scraped, 1);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.stop_reason, StopReason::EmptyPage);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let extractor = ScriptedExtractor::new(&[(1, 2, true), (2, 2, true), (3, 2, true)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3);

        let outcome = run(&driver, "X", 2).await;

        assert!(outcome.success);
        assert_eq!(outcome.pages_scraped, 2);
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.stop_reason, StopReason::BudgetExhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_exhaustion_fails_with_partial_results() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.queue(2, Err(FetchError::Server(500)), 10);
        let extractor = ScriptedExtractor::new(&[(1, 5, true), (2, 5, true)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3);

        let outcome = run(&driver, "X", 3).await;

        assert!(!outcome.success);
        assert_eq!(outcome.pages_scraped, 1);
        assert_eq!(outcome.records.len(), 5);
        assert_eq!(outcome.stop_reason, StopReason::FetchFailed);
        assert_eq!(fetcher.calls(), 1 + 3);

        let error = outcome.error.unwrap();
        assert!(error.is_recoverable());
        assert_eq!(error.to_string(), "exhausted 3 retries: HTTP 500");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_transparently() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.queue(1, Err(FetchError::Transient("connection reset".into())), 2);
        let extractor = ScriptedExtractor::new(&[(1, 3, false)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 4);

        let outcome = run(&driver, "X", 3).await;

        assert!(outcome.success);
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.queue(1, Err(FetchError::Client(404)), 1);
        let extractor = ScriptedExtractor::new(&[(1, 3, false)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 5);

        let outcome = run(&driver, "X", 3).await;

        assert!(!outcome.success);
        assert_eq!(fetcher.calls(), 1);
        let error = outcome.error.unwrap();
        assert!(!error.is_recoverable());
        assert_eq!(error.to_string(), "HTTP 404: non-retryable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_page_is_retried() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.queue(
            1,
            Ok(RawPage {
                status: 503,
                content: String::new(),
            }),
            1,
        );
        let extractor = ScriptedExtractor::new(&[(1, 2, false)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3);

        let outcome = run(&driver, "X", 1).await;

        assert!(outcome.success);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_failure_keeps_partial_results() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.queue(2, Ok(RawPage::ok("garbage")), 1);
        let extractor = ScriptedExtractor::new(&[(1, 4, true), (2, 4, true)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3);

        let outcome = run(&driver, "X", 3).await;

        assert!(outcome.success);
        assert_eq!(outcome.pages_scraped, 1);
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.stop_reason, StopReason::ExtractionFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_served_from_cache() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let extractor = ScriptedExtractor::new(&[(1, 3, false)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3);

        let first = run(&driver, "Desk Lamp", 2).await;
        let second = run(&driver, " desk lamp ", 2).await;

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.stop_reason, StopReason::Cached);
        assert_eq!(second.records, first.records);
        assert_eq!(fetcher.calls(), 1);

        let other_budget = run(&driver, "desk lamp", 3).await;
        assert!(!other_budget.from_cache);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let driver = create_test_driver(Arc::clone(&fetcher), ScriptedExtractor::new(&[]), 3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = driver.run("X", 3, &NoopProgress, &cancel).await;

        assert!(!outcome.success);
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert!(matches!(outcome.error, Some(HarvestError::Cancelled)));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_keyword_rejected() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let driver = create_test_driver(Arc::clone(&fetcher), ScriptedExtractor::new(&[]), 3);

        let outcome = run(&driver, "   ", 3).await;

        assert!(!outcome.success);
        assert_eq!(outcome.stop_reason, StopReason::InvalidInput);
        assert!(matches!(outcome.error, Some(HarvestError::InvalidKeyword(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_and_ends_at_100() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let extractor = ScriptedExtractor::new(&[(1, 1, true), (2, 1, true), (3, 1, true)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            FnProgress(move |u: ProgressUpdate| seen.lock().unwrap().push(u.progress))
        };

        driver
            .run("X", 3, &sink, &CancellationToken::new())
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reports_zero_progress() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.queue(1, Err(FetchError::Client(403)), 1);
        let driver = create_test_driver(Arc::clone(&fetcher), ScriptedExtractor::new(&[]), 3);

        let last = Arc::new(Mutex::new(None));
        let sink = {
            let last = Arc::clone(&last);
            FnProgress(move |u: ProgressUpdate| *last.lock().unwrap() = Some(u))
        };

        driver.run("lamp", 2, &sink, &CancellationToken::new()).await;

        let last = last.lock().unwrap().clone().unwrap();
        assert_eq!(last.progress, 0);
        assert_eq!(last.message, "Failed to scrape 'lamp': HTTP 403: non-retryable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_notice_can_be_suppressed() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.queue(1, Err(FetchError::Client(403)), 1);
        let driver = create_test_driver(Arc::clone(&fetcher), ScriptedExtractor::new(&[]), 3)
            .without_failure_notices();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            FnProgress(move |u: ProgressUpdate| seen.lock().unwrap().push(u))
        };

        let outcome = driver.run("lamp", 2, &sink, &CancellationToken::new()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap().to_string(), "HTTP 403: non-retryable");
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|u| u.progress > 0));
        assert!(seen.iter().all(|u| !u.message.starts_with("Failed to scrape")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_are_persisted() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let extractor = ScriptedExtractor::new(&[(1, 2, false)]);
        let sink = Arc::new(SqliteResultSink::open_in_memory().unwrap());
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3)
            .with_sink(Arc::clone(&sink) as Arc<dyn ResultSink>);

        let outcome = run(&driver, "lamp", 1).await;

        assert_eq!(outcome.locator.as_deref(), Some("sqlite::memory:#harvest=1"));
        assert_eq!(sink.load_records(1).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_share_rate_limit() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let extractor = ScriptedExtractor::new(&[(1, 1, true), (2, 1, true), (3, 1, true)]);
        let driver = create_test_driver(Arc::clone(&fetcher), extractor, 3)
            .with_endpoint("slow", EndpointLimit::new(1.0, 1.0));

        let start = Instant::now();
        let outcome = run(&driver, "X", 3).await;

        assert!(outcome.success);
        assert!(Instant::now() - start >= Duration::from_secs(2));
    }

    #[test]
    fn test_page_progress() {
        assert_eq!(page_progress(1, 5), 5);
        assert_eq!(page_progress(2, 5), 23);
        assert_eq!(page_progress(5, 5), 77);
        assert_eq!(page_progress(1, 1), 5);
        assert!(page_progress(20, 20) <= 95);
    }
}
