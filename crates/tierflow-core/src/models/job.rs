//! Data-movement job status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TierflowError;

/// Job lifecycle: pending → running → {completed, failed, cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Running,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    /// Terminal states are sticky once observed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Map a fabric status string onto the job state machine.
    ///
    /// Unrecognized values are treated as pending.
    pub fn from_fabric(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "RUNNING" | "EXECUTING" | "IN_PROGRESS" | "ACTIVE" | "STARTED" => JobState::Running,
            "COMPLETED" | "COMPLETE" | "SUCCEEDED" | "SUCCESS" | "DONE" | "FINISHED" => {
                JobState::Completed
            }
            "FAILED" | "FAILURE" | "ERROR" => JobState::Failed,
            "CANCELLED" | "CANCELED" | "ABORTED" => JobState::Cancelled,
            _ => JobState::Pending,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = TierflowError;

    /// Strict parse used for caller-supplied filters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TierflowError::invalid_params(format!("unknown job state '{}'", s)))
    }
}

/// Observed status of one data-movement job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    /// Percentage complete, 0-100.
    pub progress: f32,
    pub error_message: Option<String>,
    pub name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    /// A freshly registered job that has not been polled yet.
    pub fn pending(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Pending,
            progress: 0.0,
            error_message: None,
            name: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
