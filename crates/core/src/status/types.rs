use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a run stopped before every job could finish on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// A worker exited with the reserved fatal code.
    FatalExit,
    /// The orchestrator received SIGINT/SIGTERM.
    Interrupted,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FatalExit => write!(f, "fatal_exit"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Aggregate state of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub is_running: bool,
    pub total_jobs: u32,
    pub success_count: u32,
    pub failure_count: u32,
    /// Set once a fatal condition is seen; never cleared within a run.
    pub aborted: bool,
    #[serde(default)]
    pub abort_reason: Option<AbortReason>,
    pub start_time: DateTime<Utc>,
    /// `None` while the run is in progress.
    pub end_time: Option<DateTime<Utc>>,
}

impl RunState {
    /// Fresh state for a run that is starting now.
    pub fn start(total_jobs: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            is_running: true,
            total_jobs,
            success_count: 0,
            failure_count: 0,
            aborted: false,
            abort_reason: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Jobs with a final outcome.
    pub fn completed(&self) -> u32 {
        self.success_count + self.failure_count
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_failures(&mut self, count: u32) {
        self.failure_count += count;
    }

    pub fn mark_aborted(&mut self, reason: AbortReason) {
        if !self.aborted {
            self.aborted = true;
            self.abort_reason = Some(reason);
        }
    }

    /// Move to the terminal, not-running state.
    pub fn finish(&mut self) {
        self.is_running = false;
        self.end_time = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_state() {
        let state = RunState::start(5);
        assert!(state.is_running);
        assert_eq!(state.total_jobs, 5);
        assert_eq!(state.completed(), 0);
        assert!(!state.aborted);
        assert!(state.end_time.is_none());
    }

    #[test]
    fn test_counts_and_finish() {
        let mut state = RunState::start(3);
        state.record_success();
        state.record_failures(2);
        assert_eq!(state.completed(), 3);

        state.finish();
        assert!(!state.is_running);
        assert!(state.end_time.unwrap() >= state.start_time);
    }

    #[test]
    fn test_abort_reason_is_sticky() {
        let mut state = RunState::start(3);
        state.mark_aborted(AbortReason::FatalExit);
        state.mark_aborted(AbortReason::Interrupted);
        assert!(state.aborted);
        assert_eq!(state.abort_reason, Some(AbortReason::FatalExit));
    }

    #[test]
    fn test_serialization_field_names() {
        let mut state = RunState::start(2);
        state.mark_aborted(AbortReason::Interrupted);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["is_running"], true);
        assert_eq!(json["success_count"], 0);
        assert_eq!(json["failure_count"], 0);
        assert_eq!(json["aborted"], true);
        assert_eq!(json["abort_reason"], "interrupted");
        assert!(json["end_time"].is_null());
        assert!(json["start_time"].is_string());

        let parsed: RunState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);
    }
}
