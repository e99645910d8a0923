//! Types for the job orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::status::AbortReason;

/// Exit code a worker uses to say no remaining job can succeed.
pub const FATAL_EXIT_CODE: i32 = 5;

/// Errors that stop a run before it starts.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid run settings: {0}")]
    InvalidConfig(String),
}

/// Lifecycle of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Starting,
    Running,
    Succeeded,
    Failed,
    /// Drained from the queue or terminated by an abort.
    Aborted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

/// How a finished worker is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    /// Failed, and every other job should be abandoned.
    Fatal,
}

impl JobOutcome {
    /// Classify an exit code. `None` means the worker was killed by a signal.
    pub fn classify(exit_code: Option<i32>) -> Self {
        match exit_code {
            Some(0) => Self::Succeeded,
            Some(FATAL_EXIT_CODE) => Self::Fatal,
            _ => Self::Failed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCESS",
            Self::Failed | Self::Fatal => "FAILED",
        }
    }
}

/// One unit of work, tracked for the lifetime of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u32,
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Job {
    pub fn queued(id: u32) -> Self {
        Self {
            id,
            state: JobState::Queued,
            exit_code: None,
            start_time: None,
            end_time: None,
        }
    }

    pub(crate) fn finish(&mut self, state: JobState, exit_code: Option<i32>) {
        self.state = state;
        self.exit_code = exit_code;
        self.end_time = Some(Utc::now());
    }
}

/// What a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total_jobs: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub aborted: bool,
    pub abort_reason: Option<AbortReason>,
    /// Highest number of workers alive at once.
    pub peak_active: usize,
    pub jobs: Vec<Job>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_exit_codes() {
        assert_eq!(JobOutcome::classify(Some(0)), JobOutcome::Succeeded);
        assert_eq!(JobOutcome::classify(Some(1)), JobOutcome::Failed);
        assert_eq!(JobOutcome::classify(Some(2)), JobOutcome::Failed);
        assert_eq!(JobOutcome::classify(Some(5)), JobOutcome::Fatal);
        assert_eq!(JobOutcome::classify(Some(-1)), JobOutcome::Failed);
        assert_eq!(JobOutcome::classify(None), JobOutcome::Failed);
    }

    #[test]
    fn test_job_state_terminal() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Aborted.is_terminal());
    }

    #[test]
    fn test_job_finish() {
        let mut job = Job::queued(4);
        job.finish(JobState::Failed, Some(1));
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.exit_code, Some(1));
        assert!(job.end_time.is_some());
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::InvalidConfig("max_parallel must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "invalid run settings: max_parallel must be at least 1"
        );
    }
}
