use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use super::{LogHandle, LogLine, RelayMessage};

/// Path of the log file for one job inside `log_dir`.
pub fn job_log_path(log_dir: &Path, job_id: u32) -> PathBuf {
    log_dir.join(format!("worker_{}.log", job_id))
}

/// Log file of a job whose output is still being read.
struct JobLog {
    open_streams: u32,
    file: Option<File>,
}

/// Background task that appends relayed lines to the run logs
///
/// A job's file is held open only while one of its readers is live; lines
/// for a job with no live reader are appended with a one-shot open.
pub struct LogWriter {
    rx: mpsc::Receiver<RelayMessage>,
    log_dir: PathBuf,
    combined_path: PathBuf,
    combined: Option<File>,
    live: HashMap<u32, JobLog>,
}

impl LogWriter {
    pub fn new(rx: mpsc::Receiver<RelayMessage>, log_dir: PathBuf, combined_path: PathBuf) -> Self {
        Self {
            rx,
            log_dir,
            combined_path,
            combined: None,
            live: HashMap::new(),
        }
    }

    /// Run the writer, consuming messages until every handle is dropped
    ///
    /// This should be spawned as a background task. Write failures are
    /// logged and the line is skipped.
    pub async fn run(mut self) {
        tracing::debug!("Log writer started");
        while let Some(msg) = self.rx.recv().await {
            self.handle(msg).await;
        }
        tracing::debug!("Log writer shutting down");
    }

    /// Per-job files currently held open.
    pub fn open_job_logs(&self) -> usize {
        self.live.values().filter(|log| log.file.is_some()).count()
    }

    async fn handle(&mut self, msg: RelayMessage) {
        match msg {
            RelayMessage::Line(line) => self.write_line(&line).await,
            RelayMessage::StreamOpened(job_id) => {
                self.live
                    .entry(job_id)
                    .or_insert(JobLog {
                        open_streams: 0,
                        file: None,
                    })
                    .open_streams += 1;
            }
            RelayMessage::StreamClosed(job_id) => {
                if let Some(log) = self.live.get_mut(&job_id) {
                    log.open_streams = log.open_streams.saturating_sub(1);
                    if log.open_streams == 0 {
                        self.live.remove(&job_id);
                    }
                }
            }
        }
    }

    async fn write_line(&mut self, line: &LogLine) {
        let mut rendered = line.format();
        rendered.push('\n');

        if let Err(e) = self.append_combined(rendered.as_bytes()).await {
            tracing::error!(
                "Failed to write to {}: {}",
                self.combined_path.display(),
                e
            );
        }

        if let Some(job_id) = line.job_id {
            if let Err(e) = self.append_job(job_id, rendered.as_bytes()).await {
                tracing::error!(job_id, "Failed to write to job log: {}", e);
            }
        }
    }

    async fn append_combined(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if self.combined.is_none() {
            self.combined = Some(open_append(&self.combined_path).await?);
        }
        if let Some(file) = self.combined.as_mut() {
            file.write_all(bytes).await?;
            file.flush().await?;
        }
        Ok(())
    }

    async fn append_job(&mut self, job_id: u32, bytes: &[u8]) -> std::io::Result<()> {
        let path = job_log_path(&self.log_dir, job_id);

        let Some(log) = self.live.get_mut(&job_id) else {
            let mut file = open_append(&path).await?;
            file.write_all(bytes).await?;
            return file.flush().await;
        };

        if log.file.is_none() {
            log.file = Some(open_append(&path).await?);
        }
        if let Some(file) = log.file.as_mut() {
            file.write_all(bytes).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

/// Create a complete relay
///
/// Returns:
/// - `LogHandle` - clone this into every reader task
/// - `LogWriter` - spawn with `tokio::spawn(writer.run())`
///
/// The log directory must already exist.
pub fn create_log_system(
    log_dir: impl Into<PathBuf>,
    combined_path: impl Into<PathBuf>,
    buffer_size: usize,
) -> (LogHandle, LogWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = LogHandle::new(tx);
    let writer = LogWriter::new(rx, log_dir.into(), combined_path.into());
    (handle, writer)
}
