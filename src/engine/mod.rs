//! Process-root service wiring
//!
//! [`Engine`] owns every shared service (rate limiter, response cache,
//! pagination driver, job store, recovery manager and dead-letter queue) and
//! exposes the operations callers use to start, observe and cancel jobs.
//! Each job runs as its own tokio task under a cancellation token derived
//! from the engine's root token, so [`Engine::shutdown`] reaches all of them.

mod runner;

use crate::cache::ResponseCache;
use crate::config::{validate, Config};
use crate::jobs::{Job, JobSpec, JobStore, Subscription};
use crate::limiter::{
    RateLimiter, API_REQUEST_ENDPOINT, BATCH_SEARCH_ENDPOINT, KEYWORD_SEARCH_ENDPOINT,
};
use crate::pagination::PaginationDriver;
use crate::recovery::{DeadLetterQueue, FailedJobRecord, RecoveryManager};
use crate::source::{
    HtmlListingExtractor, HttpPageFetcher, ListingValidator, PageFetcher, RecordExtractor,
    RecordValidator,
};
use crate::storage::{open_sink, ResultSink};
use crate::{ConfigError, HarvestError, Result};
use runner::JobRunner;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

struct RunningJob {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// The harvesting service
pub struct Engine {
    config: Config,
    limiter: Arc<RateLimiter>,
    store: Arc<JobStore>,
    dead_letters: Arc<DeadLetterQueue>,
    runner: JobRunner,
    root: CancellationToken,
    tasks: Mutex<HashMap<Uuid, RunningJob>>,
}

impl Engine {
    /// Builds an engine with the default HTTP, HTML and SQLite collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - A validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Engine)` - Ready to accept jobs
    /// * `Err(HarvestError)` - The HTTP client, result database or
    ///   dead-letter queue could not be opened
    pub fn from_config(config: Config) -> Result<Self> {
        let base_url = Url::parse(&config.source.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("{}: {}", config.source.base_url, e))
        })?;

        let fetcher = HttpPageFetcher::new(&config.source)?;
        let extractor = HtmlListingExtractor::new(base_url.clone(), config.source.marketplace.clone());

        let mut validator = ListingValidator::new();
        if let Some(host) = base_url.host_str() {
            validator = validator.with_required_host(host.trim_start_matches("www."));
        }

        let sink: Option<Arc<dyn ResultSink>> = match &config.output.database_path {
            Some(path) => {
                tracing::info!("Persisting harvests to {}", path);
                Some(Arc::new(open_sink(Path::new(path))?))
            }
            None => None,
        };

        Self::new(
            config,
            Arc::new(fetcher),
            Arc::new(extractor),
            Arc::new(validator),
            sink,
        )
    }

    /// Builds an engine around caller-supplied collaborators
    ///
    /// The configuration is validated first, so a zero rate or an empty
    /// recovery schedule is rejected here rather than inside a running job.
    pub fn new(
        config: Config,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn RecordExtractor>,
        validator: Arc<dyn RecordValidator>,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Result<Self> {
        validate(&config)?;

        let limiter = Arc::new(RateLimiter::new());
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.max_entries,
        ));

        let mut driver = PaginationDriver::new(
            Arc::clone(&limiter),
            cache,
            fetcher,
            extractor,
            validator,
            config.retry.policy(),
        )
        .with_endpoint(
            KEYWORD_SEARCH_ENDPOINT,
            config.limit_for(KEYWORD_SEARCH_ENDPOINT),
        )
        .without_failure_notices();
        if let Some(sink) = sink {
            driver = driver.with_sink(sink);
        }

        let dead_letters = Arc::new(DeadLetterQueue::open(&config.recovery.dead_letter_path)?);

        let recovery = RecoveryManager::new(
            config.recovery.max_retries,
            config.recovery.retry_delays(),
            Arc::clone(&dead_letters),
        );

        let store = Arc::new(JobStore::new(config.jobs.subscriber_buffer));

        let runner = JobRunner {
            store: Arc::clone(&store),
            driver: Arc::new(driver),
            recovery: Arc::new(recovery),
        };

        Ok(Self {
            config,
            limiter,
            store,
            dead_letters,
            runner,
            root: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Validates a request and starts a job for it
    ///
    /// # Arguments
    ///
    /// * `keyword` - Search keyword, trimmed before validation
    /// * `max_pages` - Page budget, or `None` for the configured default
    ///
    /// # Returns
    ///
    /// * `Ok(Uuid)` - The new job's id
    /// * `Err(HarvestError)` - The keyword or page budget was rejected, or
    ///   the engine is shutting down
    pub async fn start_job(&self, keyword: &str, max_pages: Option<u32>) -> Result<Uuid> {
        let spec = self.spec(keyword, max_pages)?;
        self.acquire_request(API_REQUEST_ENDPOINT).await?;
        self.spawn(spec)
    }

    /// Starts one job per keyword
    ///
    /// Every keyword is validated before any job starts, so an invalid entry
    /// rejects the whole batch.
    pub async fn start_batch<S: AsRef<str>>(
        &self,
        keywords: &[S],
        max_pages: Option<u32>,
    ) -> Result<Vec<Uuid>> {
        let specs = keywords
            .iter()
            .map(|keyword| self.spec(keyword.as_ref(), max_pages))
            .collect::<Result<Vec<_>>>()?;

        self.acquire_request(BATCH_SEARCH_ENDPOINT).await?;

        tracing::info!("Starting batch of {} job(s)", specs.len());
        specs.into_iter().map(|spec| self.spawn(spec)).collect()
    }

    /// Returns a snapshot of a job
    pub fn job_status(&self, id: Uuid) -> Result<Job> {
        self.store.get(id)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.store.list()
    }

    /// Subscribes to a job's progress events
    ///
    /// The stream starts with the job's current snapshot and ends once the
    /// job reaches a terminal status.
    pub fn subscribe_progress(&self, id: Uuid) -> Result<Subscription> {
        self.store.subscribe(id)
    }

    pub fn unsubscribe_progress(&self, id: Uuid, subscription_id: u64) -> bool {
        self.store.unsubscribe(id, subscription_id)
    }

    /// Requests cancellation of a job
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The job was still running and has been signalled
    /// * `Ok(false)` - The job had already finished
    /// * `Err(HarvestError::JobNotFound)` - No such job
    pub fn cancel_job(&self, id: Uuid) -> Result<bool> {
        let job = self.store.get(id)?;
        if job.status.is_terminal() {
            return Ok(false);
        }

        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        match tasks.get(&id) {
            Some(task) if !task.handle.is_finished() => {
                tracing::info!("Cancelling job {}", id);
                task.cancel.cancel();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Waits for a job's task to finish and returns its final snapshot
    pub async fn wait(&self, id: Uuid) -> Result<Job> {
        let handle = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.remove(&id).map(|task| task.handle)
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Job task {} ended abnormally: {}", id, e);
            }
        }
        self.store.get(id)
    }

    pub fn list_dead_letter_jobs(&self) -> Vec<FailedJobRecord> {
        self.dead_letters.get_all()
    }

    /// Removes a dead-letter record, returning whether it existed
    pub fn remove_dead_letter(&self, job_id: Uuid) -> Result<bool> {
        Ok(self.dead_letters.remove(job_id)?)
    }

    /// Starts a fresh job for a dead-lettered keyword and drops its record
    ///
    /// The new job uses the configured default page budget.
    pub async fn replay_dead_letter(&self, job_id: Uuid) -> Result<Uuid> {
        let record = self
            .dead_letters
            .get(job_id)
            .ok_or(HarvestError::JobNotFound(job_id))?;

        let new_id = self.start_job(&record.keyword, None).await?;
        self.dead_letters.remove(job_id)?;

        tracing::info!("Replayed dead-lettered job {} as {}", job_id, new_id);
        Ok(new_id)
    }

    /// Cancels every running job and waits for their tasks to finish
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down engine");
        self.root.cancel();

        let handles: Vec<(Uuid, JoinHandle<()>)> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain().map(|(id, task)| (id, task.handle)).collect()
        };

        for (id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!("Job task {} ended abnormally: {}", id, e);
            }
        }
    }

    fn spec(&self, keyword: &str, max_pages: Option<u32>) -> Result<JobSpec> {
        let max_pages = max_pages.unwrap_or(self.config.jobs.default_max_pages);
        JobSpec::validated(keyword, max_pages, &self.config.jobs)
    }

    async fn acquire_request(&self, endpoint: &str) -> Result<()> {
        self.limiter
            .acquire_with_cancel(endpoint, self.config.limit_for(endpoint), 1.0, &self.root)
            .await
            .map_err(|_| HarvestError::Cancelled)
    }

    fn spawn(&self, spec: JobSpec) -> Result<Uuid> {
        if self.root.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        let id = self.store.create(spec.clone());
        let cancel = self.root.child_token();
        let handle = tokio::spawn(self.runner.clone().run(id, spec, cancel.clone()));

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|_, task| !task.handle.is_finished());
        tasks.insert(id, RunningJob { cancel, handle });

        Ok(id)
    }
}
