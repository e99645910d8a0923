//! Bounded set of running workers.
//!
//! This is the only place where worker process lifetime changes: exits are
//! observed with non-blocking polls, and termination goes through a
//! graceful stop followed by a kill once the grace period runs out.

use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::launcher::WorkerProcess;

/// How long to wait for a killed worker to be reaped.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is full ({capacity} slots)")]
    AtCapacity { capacity: usize },

    #[error("job {0} is already active")]
    AlreadyRegistered(u32),
}

#[derive(Debug)]
pub struct WorkerSlotPool {
    capacity: usize,
    active: Vec<WorkerProcess>,
    peak: usize,
}

impl WorkerSlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            active: Vec::with_capacity(capacity),
            peak: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.capacity
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Highest number of simultaneously registered workers so far.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn active_ids(&self) -> Vec<u32> {
        self.active.iter().map(|w| w.job_id()).collect()
    }

    /// Take ownership of a started worker.
    ///
    /// On error the worker is dropped, which kills it.
    pub fn register(&mut self, worker: WorkerProcess) -> Result<(), PoolError> {
        if !self.has_capacity() {
            return Err(PoolError::AtCapacity {
                capacity: self.capacity,
            });
        }
        if self.active.iter().any(|w| w.job_id() == worker.job_id()) {
            return Err(PoolError::AlreadyRegistered(worker.job_id()));
        }
        self.active.push(worker);
        self.peak = self.peak.max(self.active.len());
        Ok(())
    }

    /// Remove and return every worker that has exited, with its exit code.
    ///
    /// Never blocks. A worker whose status cannot be read is killed and
    /// reported without an exit code.
    pub fn poll_completed(&mut self) -> Vec<(u32, Option<i32>)> {
        let mut completed = Vec::new();
        let mut i = 0;
        while i < self.active.len() {
            let worker = &mut self.active[i];
            match worker.try_exit() {
                Ok(Some(status)) => {
                    debug!(job_id = worker.job_id(), ?status, "Worker exited");
                    completed.push((worker.job_id(), status.code()));
                    self.active.remove(i);
                }
                Ok(None) => i += 1,
                Err(e) => {
                    warn!(job_id = worker.job_id(), "Failed to poll worker: {}", e);
                    worker.force_kill();
                    completed.push((worker.job_id(), None));
                    self.active.remove(i);
                }
            }
        }
        completed
    }

    /// Stop every active worker and empty the pool.
    ///
    /// Sends a graceful stop, waits up to `grace_period` for all of them,
    /// then kills whatever is still alive. Returns the ids that were active.
    pub async fn terminate_all(&mut self, grace_period: Duration) -> Vec<u32> {
        if self.active.is_empty() {
            return Vec::new();
        }

        let ids = self.active_ids();
        for worker in self.active.iter_mut() {
            debug!(job_id = worker.job_id(), pid = ?worker.pid(), "Terminating worker");
            worker.request_stop();
        }

        let waits = join_all(self.active.iter_mut().map(|w| w.wait()));
        if timeout(grace_period, waits).await.is_err() {
            debug!("Grace period elapsed, killing remaining workers");
        }

        for worker in self.active.iter_mut() {
            match worker.try_exit() {
                Ok(Some(_)) => {}
                _ => {
                    warn!(job_id = worker.job_id(), "Worker ignored stop request, killing");
                    worker.force_kill();
                    if timeout(KILL_REAP_TIMEOUT, worker.wait()).await.is_err() {
                        warn!(job_id = worker.job_id(), "Killed worker was not reaped in time");
                    }
                }
            }
        }

        self.active.clear();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Instant;
    use tokio::process::Command;

    fn spawn_sh(job_id: u32, script: &str) -> WorkerProcess {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        WorkerProcess::new(job_id, cmd.spawn().expect("sh should spawn"))
    }

    async fn poll_until(pool: &mut WorkerSlotPool, want: usize) -> Vec<(u32, Option<i32>)> {
        let mut done = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while done.len() < want && Instant::now() < deadline {
            done.extend(pool.poll_completed());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        done
    }

    #[tokio::test]
    async fn test_register_respects_capacity() {
        let mut pool = WorkerSlotPool::new(2);
        pool.register(spawn_sh(1, "sleep 5")).unwrap();
        pool.register(spawn_sh(2, "sleep 5")).unwrap();
        assert!(!pool.has_capacity());

        let err = pool.register(spawn_sh(3, "sleep 5")).unwrap_err();
        assert!(matches!(err, PoolError::AtCapacity { capacity: 2 }));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.peak(), 2);

        pool.terminate_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_job() {
        let mut pool = WorkerSlotPool::new(3);
        pool.register(spawn_sh(1, "sleep 5")).unwrap();
        let err = pool.register(spawn_sh(1, "sleep 5")).unwrap_err();
        assert!(matches!(err, PoolError::AlreadyRegistered(1)));
        pool.terminate_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_poll_completed_reports_exit_codes() {
        let mut pool = WorkerSlotPool::new(3);
        pool.register(spawn_sh(1, "exit 0")).unwrap();
        pool.register(spawn_sh(2, "exit 3")).unwrap();
        pool.register(spawn_sh(3, "sleep 5")).unwrap();

        let mut done = poll_until(&mut pool, 2).await;
        done.sort();
        assert_eq!(done, vec![(1, Some(0)), (2, Some(3))]);
        assert_eq!(pool.active_ids(), vec![3]);
        assert!(pool.has_capacity());

        pool.terminate_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_poll_completed_is_non_blocking() {
        let mut pool = WorkerSlotPool::new(1);
        pool.register(spawn_sh(1, "sleep 5")).unwrap();

        let start = Instant::now();
        assert!(pool.poll_completed().is_empty());
        assert!(start.elapsed() < Duration::from_secs(1));

        pool.terminate_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_terminate_all_graceful() {
        let mut pool = WorkerSlotPool::new(2);
        pool.register(spawn_sh(1, "sleep 30")).unwrap();
        pool.register(spawn_sh(2, "sleep 30")).unwrap();

        let start = Instant::now();
        let mut ids = pool.terminate_all(Duration::from_secs(5)).await;
        ids.sort();

        assert_eq!(ids, vec![1, 2]);
        assert!(pool.is_empty());
        // SIGTERM ends `sleep` right away; no need to sit out the grace period.
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_terminate_all_kills_after_grace_period() {
        let mut pool = WorkerSlotPool::new(1);
        pool.register(spawn_sh(1, "trap '' TERM; sleep 30")).unwrap();
        // Let the shell install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let start = Instant::now();
        let ids = pool.terminate_all(Duration::from_millis(300)).await;

        assert_eq!(ids, vec![1]);
        assert!(pool.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_terminate_all_empty_pool() {
        let mut pool = WorkerSlotPool::new(1);
        assert!(pool.terminate_all(Duration::from_secs(1)).await.is_empty());
    }
}
