//! Worker output relay.
//!
//! Every worker gets two reader tasks (stdout and stderr). Readers and the
//! orchestrator push [`LogLine`]s into one bounded channel; a single
//! [`LogWriter`] task drains it into the combined run log and the per-job
//! log files, so lines from different jobs never interleave mid-line.
//! A job's file is only held open while its readers are live.

mod handle;
mod reader;
mod writer;

pub use handle::{LineSource, LogHandle, LogLine, RelayMessage};
pub use reader::spawn_stream_reader;
pub use writer::{create_log_system, job_log_path, LogWriter};
