//! Per-job lifecycle
//!
//! A job runs the pagination driver once. A recoverable failure hands the job
//! to the recovery manager, which either recovers it, gives up on
//! cancellation, or dead-letters it. Every outcome ends in exactly one
//! terminal status update.

use crate::jobs::{JobProgress, JobResults, JobSpec, JobStatus, JobStore};
use crate::pagination::{PaginationDriver, PaginationOutcome, START_PROGRESS};
use crate::recovery::RecoveryManager;
use crate::HarvestError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared services a job task needs
#[derive(Clone)]
pub(crate) struct JobRunner {
    pub(crate) store: Arc<JobStore>,
    pub(crate) driver: Arc<PaginationDriver>,
    pub(crate) recovery: Arc<RecoveryManager>,
}

impl JobRunner {
    pub(crate) async fn run(self, id: Uuid, spec: JobSpec, cancel: CancellationToken) {
        let JobSpec { keyword, max_pages } = spec;

        if let Err(e) = self.store.update_progress(
            id,
            START_PROGRESS,
            format!("Starting keyword search for '{}'", keyword),
            Some(JobStatus::Running),
        ) {
            tracing::warn!("Job {} could not start: {}", id, e);
            return;
        }

        tracing::info!("Job {} started for '{}' ({} pages)", id, keyword, max_pages);

        let progress = JobProgress::new(Arc::clone(&self.store), id);
        let outcome = self.driver.run(&keyword, max_pages, &progress, &cancel).await;

        match &outcome.error {
            None if outcome.success => self.complete(id, &keyword, &outcome, false),
            Some(HarvestError::Cancelled) => self.cancelled(id, &keyword),
            Some(error) if error.is_recoverable() => {
                let first_error = error.to_string();
                self.recover(id, &keyword, max_pages, &first_error, &progress, &cancel)
                    .await
            }
            _ => self.fail(id, &keyword, &outcome),
        }
    }

    async fn recover(
        &self,
        id: Uuid,
        keyword: &str,
        max_pages: u32,
        first_error: &str,
        progress: &JobProgress,
        cancel: &CancellationToken,
    ) {
        tracing::warn!("Job {} failed with '{}'; starting recovery", id, first_error);

        let driver = &*self.driver;
        let recovered = self
            .recovery
            .recover(id, keyword, first_error, progress, cancel, move |keyword| async move {
                driver
                    .run(&keyword, max_pages, progress, cancel)
                    .await
                    .into_result()
            })
            .await;

        if let Some(outcome) = recovered.value {
            self.complete(id, keyword, &outcome, true);
            return;
        }

        if recovered.cancelled {
            self.cancelled(id, keyword);
            return;
        }

        let error = HarvestError::RecoveryExhausted {
            attempts: recovered.attempts,
            last_error: recovered
                .last_error
                .unwrap_or_else(|| first_error.to_string()),
        };
        tracing::warn!("Job {} dead-lettered: {}", id, error);

        let results = JobResults {
            keyword: keyword.to_string(),
            dead_lettered: true,
            error: Some(error.to_string()),
            ..JobResults::default()
        };
        self.finish(
            id,
            results,
            0,
            format!("Failed to scrape '{}': {}", keyword, error),
            JobStatus::DeadLetter,
        );
    }

    fn complete(&self, id: Uuid, keyword: &str, outcome: &PaginationOutcome, recovered: bool) {
        let mut results = results_from(keyword, outcome);
        results.recovered = recovered;

        tracing::info!(
            "Job {} completed: {} valid record(s) from {} page(s), quality {:.3}",
            id,
            results.valid_records,
            results.pages_scraped,
            results.quality_score
        );

        let message = format!(
            "Completed keyword search for '{}': {} valid records",
            keyword, results.valid_records
        );
        self.finish(id, results, 100, message, JobStatus::Completed);
    }

    fn fail(&self, id: Uuid, keyword: &str, outcome: &PaginationOutcome) {
        let error = outcome
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown error".to_string());

        tracing::warn!("Job {} failed: {}", id, error);

        let mut results = results_from(keyword, outcome);
        results.error = Some(error.clone());
        self.finish(id, results, 0, error, JobStatus::Failed);
    }

    fn cancelled(&self, id: Uuid, keyword: &str) {
        tracing::info!("Job {} cancelled", id);

        let results = JobResults {
            keyword: keyword.to_string(),
            error: Some("cancelled".to_string()),
            ..JobResults::default()
        };
        self.finish(id, results, 0, "cancelled".to_string(), JobStatus::Failed);
    }

    fn finish(
        &self,
        id: Uuid,
        results: JobResults,
        progress: u8,
        message: String,
        status: JobStatus,
    ) {
        if let Err(e) = self.store.set_results(id, results) {
            tracing::warn!("Could not attach results to job {}: {}", id, e);
        }
        if let Err(e) = self.store.update_progress(id, progress, message, Some(status)) {
            tracing::warn!("Could not mark job {} {}: {}", id, status, e);
        }
    }
}

fn results_from(keyword: &str, outcome: &PaginationOutcome) -> JobResults {
    JobResults {
        keyword: keyword.to_string(),
        records_count: outcome.records.len(),
        locator: outcome.locator.clone(),
        pages_scraped: outcome.pages_scraped,
        total_found: outcome.total_found,
        valid_records: outcome.valid_records,
        quality_score: outcome.quality_score,
        from_cache: outcome.from_cache,
        recovered: false,
        dead_lettered: false,
        error: None,
    }
}
