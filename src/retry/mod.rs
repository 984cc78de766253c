//! Retry with exponential backoff
//!
//! This module handles:
//! - Classifying failures as retryable or fatal
//! - Treating retryable response status codes as failures even when the
//!   operation itself succeeded
//! - Sleeping between attempts on an exponential schedule
//! - Abandoning the retry chain when the caller's job is cancelled

mod policy;

pub use policy::{
    classify_status, Classification, Classify, ResponseStatus, RetryPolicy,
    RETRYABLE_STATUS_CODES,
};

use std::fmt::Display;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Final outcome of a retry chain that did not succeed
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("{last}: non-retryable")]
    Fatal { attempts: u32, last: E },

    #[error("exhausted {attempts} retries: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("HTTP {status}: non-retryable")]
    FatalStatus { attempts: u32, status: u16 },

    #[error("exhausted {attempts} retries: HTTP {status}")]
    StatusExhausted { attempts: u32, status: u16 },

    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::FatalStatus { attempts, .. }
            | Self::StatusExhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

enum Failure<E> {
    Error(E),
    Status(u16),
}

/// Executes operations under a [`RetryPolicy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Retrier;

impl Retrier {
    pub fn new() -> Self {
        Self
    }

    /// Runs `operation` until it succeeds, fails fatally, or runs out of attempts
    ///
    /// The operation receives the one-based attempt number. A successful
    /// result whose status code is an error status is treated as a failure,
    /// and that check runs before any error classification.
    ///
    /// # Arguments
    ///
    /// * `policy` - Attempt budget and backoff schedule
    /// * `cancel` - Checked before every attempt and during every sleep
    /// * `operation` - The fallible operation
    pub async fn execute<T, E, F, Fut>(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        T: ResponseStatus,
        E: Classify + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(policy, cancel, |err: &E| err.classify(), operation)
            .await
    }

    /// Like [`Retrier::execute`] with a caller-supplied error classifier
    pub async fn execute_with<T, E, C, F, Fut>(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        classify: C,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        T: ResponseStatus,
        E: Display,
        C: Fn(&E) -> Classification,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }

            attempt += 1;

            let (failure, classification) = match operation(attempt).await {
                Ok(value) => match value.status_code().and_then(|s| classify_status(s).map(|c| (s, c))) {
                    None => {
                        if attempt > 1 {
                            tracing::info!("Operation succeeded on attempt {}", attempt);
                        }
                        return Ok(value);
                    }
                    Some((status, classification)) => (Failure::Status(status), classification),
                },
                Err(err) => {
                    let classification = classify(&err);
                    (Failure::Error(err), classification)
                }
            };

            let retry_after = match classification {
                Classification::Fatal => {
                    return Err(match failure {
                        Failure::Error(last) => {
                            tracing::warn!("Attempt {} failed with non-retryable error: {}", attempt, last);
                            RetryError::Fatal { attempts: attempt, last }
                        }
                        Failure::Status(status) => {
                            tracing::warn!("Attempt {} returned non-retryable status {}", attempt, status);
                            RetryError::FatalStatus { attempts: attempt, status }
                        }
                    });
                }
                Classification::Retryable { retry_after } => retry_after,
            };

            if attempt >= policy.max_attempts {
                return Err(match failure {
                    Failure::Error(last) => {
                        tracing::warn!("Giving up after {} attempts: {}", attempt, last);
                        RetryError::Exhausted { attempts: attempt, last }
                    }
                    Failure::Status(status) => {
                        tracing::warn!("Giving up after {} attempts: HTTP {}", attempt, status);
                        RetryError::StatusExhausted { attempts: attempt, status }
                    }
                });
            }

            let delay = policy.sleep_for(attempt - 1, retry_after);
            match &failure {
                Failure::Error(err) => tracing::warn!(
                    "Attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    err,
                    delay
                ),
                Failure::Status(status) => tracing::warn!(
                    "Attempt {}/{} returned HTTP {}; retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    status,
                    delay
                ),
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
