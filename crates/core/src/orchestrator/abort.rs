//! Coordinated shutdown of every pending and running job.

use std::time::Duration;

use tracing::warn;

use crate::status::{AbortReason, RunState};

use super::pool::WorkerSlotPool;
use super::queue::JobQueue;

/// Jobs discarded by an abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReport {
    pub reason: AbortReason,
    /// Never started.
    pub drained: Vec<u32>,
    /// Running when the abort hit.
    pub terminated: Vec<u32>,
}

impl AbortReport {
    pub fn discarded(&self) -> u32 {
        (self.drained.len() + self.terminated.len()) as u32
    }
}

#[derive(Debug, Clone)]
pub struct AbortCoordinator {
    grace_period: Duration,
}

impl AbortCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Abandon the rest of the run.
    ///
    /// Marks the state aborted first so nothing else gets launched, stops the
    /// pool, empties the queue, counts everything discarded as failed and
    /// moves the state to not-running. Persisting is left to the caller.
    pub async fn abort(
        &self,
        reason: AbortReason,
        queue: &mut JobQueue,
        pool: &mut WorkerSlotPool,
        state: &mut RunState,
    ) -> AbortReport {
        state.mark_aborted(reason);
        warn!(
            %reason,
            active = pool.len(),
            queued = queue.len(),
            "Aborting run"
        );

        let terminated = pool.terminate_all(self.grace_period).await;
        let drained = queue.drain();

        let report = AbortReport {
            reason,
            drained,
            terminated,
        };
        state.record_failures(report.discarded());
        state.finish();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_abort_drains_queue_and_counts_failures() {
        let mut queue = JobQueue::new();
        queue.enqueue_all(4);
        queue.dequeue();
        queue.dequeue();

        let mut pool = WorkerSlotPool::new(2);
        let mut state = RunState::start(4);
        state.record_failures(2);

        let coordinator = AbortCoordinator::new(Duration::from_secs(1));
        let report = coordinator
            .abort(AbortReason::FatalExit, &mut queue, &mut pool, &mut state)
            .await;

        assert_eq!(report.drained, vec![3, 4]);
        assert!(report.terminated.is_empty());
        assert_eq!(report.discarded(), 2);
        assert!(queue.is_empty());

        assert!(state.aborted);
        assert_eq!(state.abort_reason, Some(AbortReason::FatalExit));
        assert!(!state.is_running);
        assert!(state.end_time.is_some());
        assert_eq!(state.failure_count, 4);
        assert_eq!(state.completed(), state.total_jobs);
    }

    #[tokio::test]
    async fn test_abort_with_nothing_left() {
        let mut queue = JobQueue::new();
        let mut pool = WorkerSlotPool::new(1);
        let mut state = RunState::start(1);
        state.record_success();

        let report = AbortCoordinator::new(Duration::from_millis(10))
            .abort(AbortReason::Interrupted, &mut queue, &mut pool, &mut state)
            .await;

        assert_eq!(report.discarded(), 0);
        assert_eq!(state.success_count, 1);
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.abort_reason, Some(AbortReason::Interrupted));
    }
}
