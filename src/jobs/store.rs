use crate::jobs::{Job, JobResults, JobSpec, JobStatus, ProgressEvent, ProgressHub, Subscription};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::{HarvestError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Volatile registry of jobs plus their progress hub
///
/// Job state lives only for the lifetime of the process. Every update is
/// published to the job's subscribers while the registry lock is held, so a
/// new subscriber's snapshot and the events that follow it never overlap or
/// leave a gap.
#[derive(Debug)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
    hub: ProgressHub,
}

impl JobStore {
    /// Creates an empty store
    ///
    /// # Arguments
    ///
    /// * `subscriber_buffer` - Events buffered per subscriber before it is dropped
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            hub: ProgressHub::new(subscriber_buffer),
        }
    }

    /// Registers a pending job and returns its id
    pub fn create(&self, spec: JobSpec) -> Uuid {
        let job = Job::new(spec);
        let id = job.id;

        tracing::info!("Created job {} for '{}' ({} pages)", id, job.keyword, job.max_pages);

        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(id, job);
        id
    }

    /// Returns a snapshot of a job
    pub fn get(&self, id: Uuid) -> Result<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(&id).cloned().ok_or(HarvestError::JobNotFound(id))
    }

    /// Returns snapshots of every job, oldest first
    pub fn list(&self) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Job> = jobs.values().cloned().collect();
        list.sort_by_key(|job| job.created_at);
        list
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Updates a job's progress and optionally its status, then notifies subscribers
    ///
    /// # Arguments
    ///
    /// * `id` - The job to update
    /// * `progress` - Percentage complete, capped at 100. While the job is
    ///   not terminal, a value below the current progress is raised to it, so
    ///   subscribers never see progress go backwards. A terminal update
    ///   stores the value as given.
    /// * `message` - Human-readable progress message
    /// * `status` - New status, or `None` to keep the current one
    ///
    /// # Returns
    ///
    /// * `Ok(ProgressEvent)` - The event that was published
    /// * `Err(HarvestError::JobNotFound)` - No such job
    /// * `Err(HarvestError::InvalidTransition)` - The job is terminal or the
    ///   status change is not allowed
    pub fn update_progress(
        &self,
        id: Uuid,
        progress: u8,
        message: impl Into<String>,
        status: Option<JobStatus>,
    ) -> Result<ProgressEvent> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(&id).ok_or(HarvestError::JobNotFound(id))?;

        let next = status.unwrap_or(job.status);
        if !job.status.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: job.status,
                to: next,
            });
        }

        if next != job.status {
            tracing::debug!("Job {} status {} -> {}", id, job.status, next);
        }

        let progress = progress.min(100);
        let now = Utc::now();
        job.progress = if next.is_terminal() {
            progress
        } else {
            progress.max(job.progress)
        };
        job.status = next;
        job.message = message.into();
        job.updated_at = now;

        let event = ProgressEvent {
            job_id: id,
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            timestamp: now,
        };

        self.hub.publish(&event);
        Ok(event)
    }

    /// Attaches results to a job that has not yet reached a terminal status
    pub fn set_results(&self, id: Uuid, results: JobResults) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(&id).ok_or(HarvestError::JobNotFound(id))?;

        if job.status.is_terminal() {
            return Err(HarvestError::InvalidTransition {
                from: job.status,
                to: job.status,
            });
        }

        job.results = Some(results);
        job.updated_at = Utc::now();
        Ok(())
    }

    /// Subscribes to a job's progress
    ///
    /// The subscription first yields the job's current snapshot. For a job
    /// that is already terminal the stream ends right after it.
    pub fn subscribe(&self, id: Uuid) -> Result<Subscription> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get(&id).ok_or(HarvestError::JobNotFound(id))?;

        let snapshot = ProgressEvent {
            job_id: id,
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            timestamp: job.updated_at,
        };

        Ok(self.hub.subscribe(id, Some(snapshot)))
    }

    /// Detaches a subscriber, returning whether it was attached
    pub fn unsubscribe(&self, id: Uuid, subscription_id: u64) -> bool {
        self.hub.unsubscribe(id, subscription_id)
    }

    pub fn subscriber_count(&self, id: Uuid) -> usize {
        self.hub.subscriber_count(id)
    }

    /// Removes a job and closes its subscribers
    pub fn evict(&self, id: Uuid) -> Option<Job> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let removed = jobs.remove(&id);
        self.hub.close(id);

        if removed.is_some() {
            tracing::debug!("Evicted job {}", id);
        }
        removed
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(64)
    }
}

/// [`ProgressSink`] that writes into one job of a [`JobStore`]
#[derive(Debug, Clone)]
pub struct JobProgress {
    store: Arc<JobStore>,
    job_id: Uuid,
}

impl JobProgress {
    pub fn new(store: Arc<JobStore>, job_id: Uuid) -> Self {
        Self { store, job_id }
    }
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn notify(&self, update: ProgressUpdate) {
        if let Err(e) =
            self.store
                .update_progress(self.job_id, update.progress, update.message, update.status)
        {
            tracing::debug!("Progress update for job {} rejected: {}", self.job_id, e);
        }
    }
}
