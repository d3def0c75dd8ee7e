/// Job status definitions for tracking crawl job lifecycles
///
/// A job is created `Pending`, becomes `Running` when the scheduler launches
/// it and ends `Completed` or `Failed`. `Paused` is only reachable through an
/// external pause while running, and leaves again through resume.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current lifecycle state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but never launched
    Pending,

    /// A run is in progress
    Running,

    /// Finished naturally, reached a boundary, or was stopped manually
    Completed,

    /// Retry budget exhausted or an unexpected error ended the run
    Failed,

    /// Cancelled externally; progress is kept for a later resume
    Paused,
}

impl JobStatus {
    /// Returns true if no further run is expected for this job
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the job may be launched by `start`
    pub fn can_start(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    /// Returns all possible job statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Paused,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
