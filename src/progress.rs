//! Progress notification interface
//!
//! Every component that reports progress does so through [`ProgressSink`],
//! which has a single asynchronous `notify` method. Synchronous callbacks are
//! wrapped with [`FnProgress`].

use crate::jobs::JobStatus;
use async_trait::async_trait;

/// A single progress notification
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Percentage complete, 0 to 100
    pub progress: u8,

    pub message: String,

    /// New job status, when the update also changes status
    pub status: Option<JobStatus>,
}

impl ProgressUpdate {
    pub fn new(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: progress.min(100),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Receiver of progress notifications
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn notify(&self, update: ProgressUpdate);
}

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn notify(&self, _update: ProgressUpdate) {}
}

/// Adapts a synchronous closure into a [`ProgressSink`]
pub struct FnProgress<F>(pub F);

#[async_trait]
impl<F> ProgressSink for FnProgress<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    async fn notify(&self, update: ProgressUpdate) {
        (self.0)(update)
    }
}
