/// Job status definitions
///
/// This module defines every status a job can hold and which changes between
/// them are allowed.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current status of a harvest job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    // ===== Active States =====
    /// Job has been created but not yet started
    Pending,

    /// Job is fetching pages
    Running,

    /// Job failed and is being re-run by recovery
    Retrying,

    // ===== Terminal States =====
    /// Job finished successfully
    Completed,

    /// Job failed without recovery (fatal error or cancellation)
    Failed,

    /// Job exhausted recovery and was recorded in the dead-letter queue
    DeadLetter,
}

impl JobStatus {
    /// Returns true if no further status changes are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::DeadLetter)
    }

    /// Returns true if moving from `self` to `next` is allowed
    ///
    /// Staying in the same non-terminal status is allowed (a plain progress
    /// update). Terminal statuses accept nothing.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (Pending, Running | Failed)
                | (Running, Retrying | Completed | Failed)
                | (Retrying, Completed | Failed | DeadLetter)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::DeadLetter => "dead_letter",
        }
    }

    /// Parses a status from its string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "retrying" => Some(Self::Retrying),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "dead_letter" => Some(Self::DeadLetter),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
