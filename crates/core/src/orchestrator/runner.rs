//! Job orchestrator implementation.
//!
//! A single control task owns the queue, the worker pool and the run state:
//! - Launch: jobs start in id order, one at a time, `stagger` apart
//! - Monitor: exits are picked up with non-blocking polls every `poll_interval`
//! - Abort: a fatal exit code or a stop request tears everything down

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::launcher::Launcher;
use crate::relay::{create_log_system, spawn_stream_reader, LineSource, LogHandle};
use crate::status::{AbortReason, RunState, StatusStore};

use super::abort::AbortCoordinator;
use super::config::OrchestratorConfig;
use super::pool::WorkerSlotPool;
use super::queue::JobQueue;
use super::types::{Job, JobOutcome, JobState, OrchestratorError, RunSummary, FATAL_EXIT_CODE};

/// Requests an orderly stop of a running orchestrator.
///
/// Cloneable; typically handed to a signal handler.
#[derive(Clone)]
pub struct StopHandle {
    tx: broadcast::Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(());
    }
}

/// The job orchestrator - runs `total_jobs` workers under a concurrency cap.
pub struct Orchestrator<L>
where
    L: Launcher + 'static,
{
    config: OrchestratorConfig,
    launcher: L,
    status_store: Arc<dyn StatusStore>,

    // Runtime state
    queue: JobQueue,
    pool: WorkerSlotPool,
    state: RunState,
    jobs: Vec<Job>,
    launched: u32,
    readers: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<L> Orchestrator<L>
where
    L: Launcher + 'static,
{
    /// Create a new orchestrator.
    pub fn new(config: OrchestratorConfig, launcher: L, status_store: Arc<dyn StatusStore>) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let pool = WorkerSlotPool::new(config.max_parallel);
        let state = RunState::start(config.total_jobs);

        Self {
            config,
            launcher,
            status_store,
            queue: JobQueue::new(),
            pool,
            state,
            jobs: Vec::new(),
            launched: 0,
            readers: Vec::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Handle that makes [`Orchestrator::run`] abort as if interrupted.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run every job to completion or until the run is aborted.
    ///
    /// Only unusable settings are returned as errors; job failures, launch
    /// failures and I/O errors (logs included) are counted or logged.
    pub async fn run(mut self) -> Result<RunSummary, OrchestratorError> {
        if self.config.total_jobs == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "total_jobs must be at least 1".to_string(),
            ));
        }
        if self.config.max_parallel == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_parallel must be at least 1".to_string(),
            ));
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.config.log_dir).await {
            error!(
                "Failed to create log directory {}: {}, continuing without run logs",
                self.config.log_dir.display(),
                e
            );
        }

        let (relay, writer) = create_log_system(
            &self.config.log_dir,
            &self.config.combined_log,
            self.config.relay_buffer,
        );
        let writer_handle = tokio::spawn(writer.run());

        let total = self.config.total_jobs;
        self.queue.enqueue_all(total);
        self.jobs = (1..=total).map(Job::queued).collect();
        self.persist();

        info!(
            run_id = %self.state.run_id,
            total_jobs = total,
            max_parallel = self.pool.capacity(),
            launcher = self.launcher.name(),
            "Starting run"
        );
        relay
            .note(
                None,
                format!(
                    "[INFO] Starting automation: {} orders, max {} parallel windows",
                    total,
                    self.pool.capacity()
                ),
            )
            .await;

        self.drive(&relay).await;

        if !self.state.aborted {
            self.state.finish();
            self.persist();
            info!("All {} jobs completed", total);
            relay
                .note(None, format!("[INFO] All {} orders completed!", total))
                .await;
        }

        let stats = format!(
            "[INFO] Final stats: Success={}, Failure={}",
            self.state.success_count, self.state.failure_count
        );
        info!(
            success = self.state.success_count,
            failure = self.state.failure_count,
            aborted = self.state.aborted,
            "Run finished"
        );
        relay.note(None, stats).await;

        self.drain_readers(&relay).await;
        drop(relay);
        if let Err(e) = writer_handle.await {
            error!("Log writer task failed: {}", e);
        }

        Ok(RunSummary {
            run_id: self.state.run_id,
            total_jobs: total,
            success_count: self.state.success_count,
            failure_count: self.state.failure_count,
            aborted: self.state.aborted,
            abort_reason: self.state.abort_reason,
            peak_active: self.pool.peak(),
            jobs: self.jobs,
        })
    }

    /// The control loop. Returns once every job is accounted for.
    async fn drive(&mut self, relay: &LogHandle) {
        let total = self.config.total_jobs;

        while self.state.completed() < total && !self.state.aborted {
            // Fill free slots, staggering every launch after the first.
            while self.pool.has_capacity() && !self.queue.is_empty() {
                if self.stop_requested() {
                    self.abort(AbortReason::Interrupted, relay).await;
                    return;
                }
                if self.launched > 0 && !self.config.stagger.is_zero() {
                    relay
                        .note(
                            None,
                            format!(
                                "[INFO] Waiting {} seconds before starting the next order...",
                                self.config.stagger.as_secs_f64()
                            ),
                        )
                        .await;
                    if self.sleep_or_stop(self.config.stagger).await {
                        self.abort(AbortReason::Interrupted, relay).await;
                        return;
                    }
                }

                let Some(job_id) = self.queue.dequeue() else {
                    break;
                };
                self.launch(job_id, relay).await;
            }

            // Collect every exit from this poll before acting on a fatal one.
            let mut fatal = false;
            for (job_id, exit_code) in self.pool.poll_completed() {
                fatal |= self.record_completion(job_id, exit_code, relay).await;
            }
            if fatal {
                self.abort(AbortReason::FatalExit, relay).await;
                return;
            }

            if self.state.completed() >= total {
                break;
            }

            if self.sleep_or_stop(self.config.poll_interval).await {
                self.abort(AbortReason::Interrupted, relay).await;
                return;
            }
        }
    }

    /// Start one job. A launch failure is counted, never propagated.
    async fn launch(&mut self, job_id: u32, relay: &LogHandle) {
        let total = self.config.total_jobs;
        if let Some(job) = self.job_mut(job_id) {
            job.state = JobState::Starting;
            job.start_time = Some(Utc::now());
        }

        info!(job_id, "Starting job {}/{}", job_id, total);
        relay
            .note(
                Some(job_id),
                format!("[INFO] Starting order {}/{}", job_id, total),
            )
            .await;

        let mut worker = match self.launcher.start(job_id).await {
            Ok(worker) => worker,
            Err(e) => {
                error!(job_id, "Failed to start job: {}", e);
                relay
                    .note(
                        Some(job_id),
                        format!("[ERROR] Failed to start order {}: {}", job_id, e),
                    )
                    .await;
                self.fail_unstarted(job_id);
                return;
            }
        };

        if let Some(stdout) = worker.take_stdout() {
            self.readers.push(spawn_stream_reader(
                job_id,
                LineSource::Stdout,
                stdout,
                relay.clone(),
            ));
        }
        if let Some(stderr) = worker.take_stderr() {
            self.readers.push(spawn_stream_reader(
                job_id,
                LineSource::Stderr,
                stderr,
                relay.clone(),
            ));
        }

        let pid = worker.pid();
        let started_at = worker.started_at();
        match self.pool.register(worker) {
            Ok(()) => {
                self.launched += 1;
                if let Some(job) = self.job_mut(job_id) {
                    job.state = JobState::Running;
                    job.start_time = Some(started_at);
                }
                info!(job_id, ?pid, "Job started");
            }
            Err(e) => {
                error!(job_id, "Failed to register worker: {}", e);
                self.fail_unstarted(job_id);
            }
        }
    }

    fn fail_unstarted(&mut self, job_id: u32) {
        if let Some(job) = self.job_mut(job_id) {
            job.finish(JobState::Failed, None);
        }
        self.state.record_failures(1);
        self.persist();
    }

    /// Count a finished worker. Returns true when its exit code is fatal.
    async fn record_completion(
        &mut self,
        job_id: u32,
        exit_code: Option<i32>,
        relay: &LogHandle,
    ) -> bool {
        let outcome = JobOutcome::classify(exit_code);
        let job_state = match outcome {
            JobOutcome::Succeeded => {
                self.state.record_success();
                JobState::Succeeded
            }
            JobOutcome::Failed | JobOutcome::Fatal => {
                self.state.record_failures(1);
                JobState::Failed
            }
        };
        if let Some(job) = self.job_mut(job_id) {
            job.finish(job_state, exit_code);
        }

        let message = format!(
            "[INFO] Order {} completed ({}, return_code={}) - {}/{} total",
            job_id,
            outcome.label(),
            exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()),
            self.state.completed(),
            self.config.total_jobs
        );
        info!(job_id, exit_code = ?exit_code, outcome = outcome.label(), "Job completed");
        self.persist();
        relay.note(Some(job_id), message).await;

        if outcome == JobOutcome::Fatal {
            error!(
                job_id,
                "Job exited with fatal code {}, stopping all workers", FATAL_EXIT_CODE
            );
            relay
                .note(
                    Some(job_id),
                    format!(
                        "[CRITICAL] Order {} reported a fatal condition. Stopping all workers...",
                        job_id
                    ),
                )
                .await;
            return true;
        }
        false
    }

    async fn abort(&mut self, reason: AbortReason, relay: &LogHandle) {
        let coordinator = AbortCoordinator::new(self.config.grace_period);
        let report = coordinator
            .abort(reason, &mut self.queue, &mut self.pool, &mut self.state)
            .await;

        for &job_id in report.drained.iter().chain(report.terminated.iter()) {
            if let Some(job) = self.job_mut(job_id) {
                if !job.state.is_terminal() {
                    job.finish(JobState::Aborted, None);
                }
            }
        }

        warn!(
            %reason,
            drained = report.drained.len(),
            terminated = report.terminated.len(),
            "Run aborted"
        );
        self.persist();
        relay
            .note(
                None,
                format!(
                    "[INFO] Run aborted ({}): marked {} remaining orders as failed ({} in queue, {} active)",
                    reason,
                    report.discarded(),
                    report.drained.len(),
                    report.terminated.len()
                ),
            )
            .await;
    }

    /// Sleep for `duration`; returns true if a stop was requested meanwhile.
    async fn sleep_or_stop(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown_rx.recv() => {
                warn!("Stop requested, aborting run");
                true
            }
            _ = tokio::time::sleep(duration) => false,
        }
    }

    /// Non-blocking check for a pending stop request.
    fn stop_requested(&mut self) -> bool {
        match self.shutdown_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Lagged(_)) => {
                warn!("Stop requested, aborting run");
                true
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
        }
    }

    /// Read every worker's remaining output until its pipes close.
    ///
    /// Readers are only cut off once none of them has produced a line for
    /// `reader_drain_timeout`, which happens when a helper spawned by a
    /// worker keeps its pipes open after the worker exited.
    async fn drain_readers(&mut self, relay: &LogHandle) {
        loop {
            self.readers.retain(|reader| !reader.is_finished());
            if self.readers.is_empty() {
                return;
            }

            let before = relay.delivered();
            let pending = join_all(self.readers.iter_mut());
            if timeout(self.config.reader_drain_timeout, pending).await.is_ok() {
                self.readers.clear();
                return;
            }
            if relay.delivered() == before {
                warn!(
                    open = self.readers.iter().filter(|r| !r.is_finished()).count(),
                    "Worker output still open with no new lines, closing readers"
                );
                for reader in &self.readers {
                    reader.abort();
                }
                self.readers.clear();
                return;
            }
        }
    }

    fn persist(&self) {
        if let Err(e) = self.status_store.save(&self.state) {
            error!("Failed to persist run status: {}", e);
        }
    }

    fn job_mut(&mut self, job_id: u32) -> Option<&mut Job> {
        let index = job_id.checked_sub(1)? as usize;
        self.jobs.get_mut(index)
    }
}
