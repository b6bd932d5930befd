//! Serialized writer for the worker's stdin.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::events::{Diagnostic, EventBridge};

/// Queue in front of one worker's stdin.
///
/// A single task owns the stream and writes one whole line per queued
/// command, so concurrent senders never interleave partial writes.
/// Queuing never blocks, which makes `send` safe to call from inside
/// event callbacks.
#[derive(Debug, Clone)]
pub struct CommandWriter {
    worker_id: u64,
    tx: mpsc::UnboundedSender<String>,
}

impl CommandWriter {
    pub fn spawn<W>(worker_id: u64, stdin: W, events: Arc<EventBridge>) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let task = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = rx.recv().await {
                let mut buf = line.into_bytes();
                buf.push(b'\n');
                let result = async {
                    stdin.write_all(&buf).await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = result {
                    error!(worker_id, error = %e, "Failed to write to worker stdin");
                    events.publish_diagnostic(&Diagnostic::WriteFailed {
                        worker_id,
                        reason: e.to_string(),
                    });
                    break;
                }
            }
            debug!(worker_id, "stdin writer finished");
        });

        (Self { worker_id, tx }, task)
    }

    pub const fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Queue one line. Returns `false` if the writer has already stopped.
    pub fn send(&self, line: String) -> bool {
        self.tx.send(line).is_ok()
    }
}

/// Collapse line breaks so one command stays one wire line.
pub fn single_line(text: &str) -> std::borrow::Cow<'_, str> {
    if text.contains(['\n', '\r']) {
        std::borrow::Cow::Owned(text.replace("\r\n", " ").replace(['\n', '\r'], " "))
    } else {
        std::borrow::Cow::Borrowed(text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn each_command_is_one_terminated_line() {
        let (client, mut server) = tokio::io::duplex(64);
        let events = Arc::new(EventBridge::new());
        let (writer, task) = CommandWriter::spawn(7, client, events);

        assert!(writer.send("/myrooms".to_string()));
        assert!(writer.send("/who".to_string()));
        drop(writer);
        task.await.unwrap();

        let mut written = String::new();
        server.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "/myrooms\n/who\n");
    }

    #[tokio::test]
    async fn concurrent_senders_do_not_interleave() {
        let (client, mut server) = tokio::io::duplex(16);
        let events = Arc::new(EventBridge::new());
        let (writer, task) = CommandWriter::spawn(1, client, events);

        let mut handles = Vec::new();
        for i in 0..8 {
            let w = writer.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..10 {
                    w.send(format!("/text sender{i} message{j} with some padding"));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        drop(writer);

        let reader = tokio::spawn(async move {
            let mut out = String::new();
            server.read_to_string(&mut out).await.unwrap();
            out
        });
        task.await.unwrap();
        let out = reader.await.unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 80);
        assert!(lines
            .iter()
            .all(|l| l.starts_with("/text sender") && l.ends_with("with some padding")));
    }

    #[tokio::test]
    async fn closed_stdin_reports_write_failure() {
        let (client, server) = tokio::io::duplex(8);
        drop(server);
        let events = Arc::new(EventBridge::new());
        let (_sub, mut diagnostics) = events.diagnostic_channel();
        let (writer, task) = CommandWriter::spawn(3, client, Arc::clone(&events));

        writer.send("/exit".to_string());
        task.await.unwrap();

        assert!(matches!(
            diagnostics.recv().await.unwrap(),
            Diagnostic::WriteFailed { worker_id: 3, .. }
        ));
        assert!(!writer.send("/who".to_string()));
    }

    #[test]
    fn line_breaks_are_flattened() {
        assert_eq!(single_line("/text a\r\nb\nc"), "/text a b c");
        assert!(matches!(single_line("/who"), std::borrow::Cow::Borrowed(_)));
    }
}
