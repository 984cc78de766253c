//! Job-level recovery and the dead-letter queue
//!
//! When a job fails with a recoverable error the [`RecoveryManager`] re-runs
//! it a bounded number of times. Jobs that still fail are recorded in the
//! [`DeadLetterQueue`], which survives process restarts.

mod dead_letter;
mod manager;

pub use dead_letter::{DeadLetterError, DeadLetterQueue, FailedJobRecord};
pub use manager::{RecoveryManager, RecoveryOutcome, RETRYING_PROGRESS};
