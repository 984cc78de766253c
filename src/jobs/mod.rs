//! Job registry and progress fan-out
//!
//! This module handles:
//! - The job status state machine
//! - Validating job requests
//! - The volatile job registry
//! - Pushing progress events to any number of subscribers

mod hub;
mod job;
mod status;
mod store;

pub use hub::{ProgressEvent, ProgressHub, Subscription};
pub use job::{Job, JobResults, JobSpec};
pub use status::JobStatus;
pub use store::{JobProgress, JobStore};
