use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Where a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    Stdout,
    Stderr,
    /// Lifecycle messages written by the orchestrator itself.
    Orchestrator,
}

/// One line headed for the run logs.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    /// `None` for run-wide messages, which only go to the combined log.
    pub job_id: Option<u32>,
    pub source: LineSource,
    pub text: String,
}

impl LogLine {
    pub fn new(job_id: Option<u32>, source: LineSource, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id,
            source,
            text: text.into(),
        }
    }

    /// Render as `[timestamp] [JOB n STREAM] text`.
    pub fn format(&self) -> String {
        let ts = self.timestamp.format("%Y-%m-%d %H:%M:%S");
        match (self.job_id, self.source) {
            (Some(id), LineSource::Stdout) => format!("[{}] [JOB {} STDOUT] {}", ts, id, self.text),
            (Some(id), LineSource::Stderr) => format!("[{}] [JOB {} STDERR] {}", ts, id, self.text),
            (Some(id), LineSource::Orchestrator) => format!("[{}] [JOB {}] {}", ts, id, self.text),
            (None, _) => format!("[{}] {}", ts, self.text),
        }
    }
}

/// Messages carried from readers and the orchestrator to the writer.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    Line(LogLine),
    /// A reader for the job started; its log file stays open until every
    /// reader of the job has closed.
    StreamOpened(u32),
    /// A reader for the job reached EOF or stopped.
    StreamClosed(u32),
}

/// Cheaply cloneable sender side of the relay.
#[derive(Clone)]
pub struct LogHandle {
    tx: mpsc::Sender<RelayMessage>,
    delivered: Arc<AtomicU64>,
}

impl LogHandle {
    pub fn new(tx: mpsc::Sender<RelayMessage>) -> Self {
        Self {
            tx,
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send a line, waiting for buffer space. Returns false once the writer is gone.
    pub async fn send(&self, line: LogLine) -> bool {
        let sent = self.tx.send(RelayMessage::Line(line)).await.is_ok();
        if sent {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    /// Record an orchestrator message, waiting for buffer space.
    pub async fn note(&self, job_id: Option<u32>, text: impl Into<String>) {
        let line = LogLine::new(job_id, LineSource::Orchestrator, text);
        if !self.send(line).await {
            tracing::error!("Run log writer is gone, dropping orchestrator message");
        }
    }

    pub async fn stream_opened(&self, job_id: u32) -> bool {
        self.tx.send(RelayMessage::StreamOpened(job_id)).await.is_ok()
    }

    pub async fn stream_closed(&self, job_id: u32) {
        let _ = self.tx.send(RelayMessage::StreamClosed(job_id)).await;
    }

    /// Lines accepted so far by all clones of this handle.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}
