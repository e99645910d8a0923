use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{LineSource, LogHandle, LogLine};

/// Spawn a task forwarding every line of `stream` to the relay.
///
/// The task ends at EOF, on a read error (logged), or when the writer is gone.
/// It brackets its lines with open/close markers so the writer knows when
/// the job's log file can be closed.
pub fn spawn_stream_reader<R>(
    job_id: u32,
    source: LineSource,
    stream: R,
    relay: LogHandle,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if !relay.stream_opened(job_id).await {
            return;
        }
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let text = text.trim_end_matches(['\n', '\r']).to_string();
                    debug!(job_id, stream = ?source, "{}", text);
                    if !relay.send(LogLine::new(Some(job_id), source, text)).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(job_id, stream = ?source, "Error reading worker output: {}", e);
                    relay
                        .note(
                            Some(job_id),
                            format!("[ERROR] Error reading {:?} for job {}: {}", source, job_id, e),
                        )
                        .await;
                    break;
                }
            }
        }
        relay.stream_closed(job_id).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayMessage;
    use tokio::sync::mpsc;

    fn drain_lines(rx: &mut mpsc::Receiver<RelayMessage>) -> Vec<LogLine> {
        let mut lines = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let RelayMessage::Line(line) = msg {
                lines.push(line);
            }
        }
        lines
    }

    #[tokio::test]
    async fn test_reader_forwards_lines_in_order() {
        let (tx, mut rx) = mpsc::channel(16);
        let relay = LogHandle::new(tx);
        let input: &[u8] = b"first\nsecond\r\nthird";

        spawn_stream_reader(4, LineSource::Stdout, input, relay)
            .await
            .unwrap();

        let mut texts = Vec::new();
        for line in drain_lines(&mut rx) {
            assert_eq!(line.job_id, Some(4));
            assert_eq!(line.source, LineSource::Stdout);
            texts.push(line.text);
        }
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_reader_replaces_invalid_utf8() {
        let (tx, mut rx) = mpsc::channel(4);
        let relay = LogHandle::new(tx);
        let input: &[u8] = b"ok \xff\xfe done\n";

        spawn_stream_reader(1, LineSource::Stderr, input, relay)
            .await
            .unwrap();

        let line = drain_lines(&mut rx).remove(0);
        assert!(line.text.starts_with("ok "));
        assert!(line.text.ends_with(" done"));
    }

    #[tokio::test]
    async fn test_reader_stops_when_writer_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let relay = LogHandle::new(tx);
        let input: &[u8] = b"a\nb\nc\n";

        // Completes instead of hanging.
        spawn_stream_reader(1, LineSource::Stdout, input, relay)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reader_brackets_stream_with_markers() {
        let (tx, mut rx) = mpsc::channel(8);
        let relay = LogHandle::new(tx);
        let input: &[u8] = b"only\n";

        spawn_stream_reader(7, LineSource::Stderr, input, relay)
            .await
            .unwrap();

        assert!(matches!(rx.try_recv(), Ok(RelayMessage::StreamOpened(7))));
        assert!(matches!(rx.try_recv(), Ok(RelayMessage::Line(_))));
        assert!(matches!(rx.try_recv(), Ok(RelayMessage::StreamClosed(7))));
        assert!(rx.try_recv().is_err());
    }
}
