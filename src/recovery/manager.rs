use crate::jobs::JobStatus;
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::recovery::DeadLetterQueue;
use crate::HarvestError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Progress shown while a job waits for its next recovery attempt
pub const RETRYING_PROGRESS: u8 = 50;

/// Result of a recovery pass
#[derive(Debug)]
pub struct RecoveryOutcome<T> {
    /// The successful run's output, if any attempt succeeded
    pub value: Option<T>,

    /// Recovery attempts made
    pub attempts: u32,

    /// The job was written to the dead-letter queue
    pub dead_lettered: bool,

    /// Recovery stopped because the job was cancelled
    pub cancelled: bool,

    /// Message of the most recent failure
    pub last_error: Option<String>,
}

impl<T> RecoveryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

/// Re-runs failed jobs on an escalating schedule
///
/// Attempts are a bounded loop: attempt `n` waits
/// `retry_delays[min(n - 1, len - 1)]` and then re-runs the whole job. When
/// every attempt fails the job is appended to the dead-letter queue.
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    max_retries: u32,
    retry_delays: Vec<Duration>,
    dead_letters: Arc<DeadLetterQueue>,
}

impl RecoveryManager {
    pub fn new(
        max_retries: u32,
        retry_delays: Vec<Duration>,
        dead_letters: Arc<DeadLetterQueue>,
    ) -> Self {
        Self {
            max_retries,
            retry_delays,
            dead_letters,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterQueue> {
        &self.dead_letters
    }

    /// Delay before the one-based recovery attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.retry_delays.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt.saturating_sub(1) as usize).min(self.retry_delays.len() - 1);
        self.retry_delays[index]
    }

    /// Re-runs a failed job until it succeeds or the retry budget runs out
    ///
    /// # Arguments
    ///
    /// * `job_id` - The failed job
    /// * `keyword` - The keyword passed to every re-run
    /// * `first_error` - The failure that triggered recovery
    /// * `progress` - Receives a `retrying` update before every wait
    /// * `cancel` - Stops recovery before or during any wait
    /// * `run` - Runs the whole job once
    pub async fn recover<T, F, Fut>(
        &self,
        job_id: Uuid,
        keyword: &str,
        first_error: &str,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
        mut run: F,
    ) -> RecoveryOutcome<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
    {
        let mut last_error = first_error.to_string();

        for attempt in 1..=self.max_retries {
            let delay = self.delay_for(attempt);

            tracing::info!(
                "Retrying job {} (attempt {}/{}) after {:?}",
                job_id,
                attempt,
                self.max_retries,
                delay
            );
            progress
                .notify(
                    ProgressUpdate::new(
                        RETRYING_PROGRESS,
                        format!(
                            "Retrying job '{}' (attempt {}/{})...",
                            keyword, attempt, self.max_retries
                        ),
                    )
                    .with_status(JobStatus::Retrying),
                )
                .await;

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Self::cancelled(attempt - 1, last_error);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match run(keyword.to_string()).await {
                Ok(value) => {
                    tracing::info!("Job {} recovered on attempt {}", job_id, attempt);
                    return RecoveryOutcome {
                        value: Some(value),
                        attempts: attempt,
                        dead_lettered: false,
                        cancelled: false,
                        last_error: None,
                    };
                }
                Err(HarvestError::Cancelled) => {
                    return Self::cancelled(attempt, last_error);
                }
                Err(e) => {
                    tracing::warn!("Recovery attempt {} for job {} failed: {}", attempt, job_id, e);
                    last_error = e.to_string();
                }
            }
        }

        if let Err(e) = self
            .dead_letters
            .add(job_id, keyword, &last_error, self.max_retries)
        {
            tracing::error!("Failed to persist dead-letter record for job {}: {}", job_id, e);
        }

        RecoveryOutcome {
            value: None,
            attempts: self.max_retries,
            dead_lettered: true,
            cancelled: false,
            last_error: Some(last_error),
        }
    }

    fn cancelled<T>(attempts: u32, last_error: String) -> RecoveryOutcome<T> {
        RecoveryOutcome {
            value: None,
            attempts,
            dead_lettered: false,
            cancelled: true,
            last_error: Some(last_error),
        }
    }
}
