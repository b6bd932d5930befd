//! Readers that turn the worker's output streams into routed lines.

use std::sync::Arc;

use sidebridge_core::protocol::LineFramer;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::bridge::ChannelRouter;
use crate::events::{Diagnostic, EventBridge, LogLine, OutputStream};

const READ_CHUNK: usize = 8 * 1024;

/// Read `stream` to EOF, handing each complete line to `on_line` in order.
async fn pump_lines<R>(
    worker_id: u64,
    stream: OutputStream,
    mut reader: R,
    events: &EventBridge,
    mut on_line: impl FnMut(&str),
) where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for line in framer.push(&chunk[..n]) {
                    on_line(&line);
                }
                report_dropped(worker_id, stream, &mut framer, events);
            }
            Err(e) => {
                warn!(worker_id, ?stream, error = %e, "Failed to read worker output");
                break;
            }
        }
    }
    if let Some(line) = framer.finish() {
        on_line(&line);
    }
    report_dropped(worker_id, stream, &mut framer, events);
    debug!(worker_id, ?stream, "reader finished");
}

fn report_dropped(worker_id: u64, stream: OutputStream, framer: &mut LineFramer, events: &EventBridge) {
    let count = framer.take_dropped();
    if count > 0 {
        warn!(worker_id, ?stream, count, "Dropped oversized output lines");
        events.publish_diagnostic(&Diagnostic::LineTooLong {
            worker_id,
            stream,
            count,
        });
    }
}

/// Frame stdout and route every line.
pub async fn pump_stdout<R>(reader: R, router: ChannelRouter, worker_id: u64)
where
    R: AsyncRead + Unpin,
{
    let events = Arc::clone(router.events());
    pump_lines(worker_id, OutputStream::Stdout, reader, &events, |line| router.route(line)).await;
}

/// Frame stderr into warn-level logs and stderr log lines.
pub async fn pump_stderr<R>(reader: R, events: Arc<EventBridge>, worker_id: u64)
where
    R: AsyncRead + Unpin,
{
    pump_lines(worker_id, OutputStream::Stderr, reader, &events, |line| {
        warn!(worker_id, "stderr: {}", line);
        events.publish_log(&LogLine {
            worker_id,
            stream: OutputStream::Stderr,
            text: line.to_string(),
        });
    })
    .await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use sidebridge_core::protocol::{ChannelEvent, ChatMessage};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn message_split_across_chunks_is_routed_once_complete() {
        let events = Arc::new(EventBridge::new());
        let (_sub, mut rx) = events.event_channel();
        let (mut tx, rx_stream) = tokio::io::duplex(256);
        let router = ChannelRouter::new(1, Arc::clone(&events));
        let pump = tokio::spawn(pump_stdout(rx_stream, router, 1));

        tx.write_all(br#"CMD:MSG:{"sender":"A","cont"#).await.unwrap();
        tx.flush().await.unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        tx.write_all(b"ent\":\"hi\"}\n").await.unwrap();
        drop(tx);
        pump.await.unwrap();

        let ChannelEvent::MessageReceived(ChatMessage { sender, content, .. }) =
            rx.recv().await.unwrap()
        else {
            panic!("expected message event");
        };
        assert_eq!(sender, "A");
        assert_eq!(content, "hi");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn trailing_fragment_is_flushed_at_eof() {
        let events = Arc::new(EventBridge::new());
        let (_sub, mut rx) = events.event_channel();
        let router = ChannelRouter::new(1, Arc::clone(&events));

        pump_stdout(&b"noise\nCMD:CONNECTED:{}"[..], router, 1).await;

        assert_eq!(rx.recv().await.unwrap(), ChannelEvent::ConnectionSuccess);
    }

    #[tokio::test]
    async fn stderr_lines_are_published_as_stderr_logs() {
        let events = Arc::new(EventBridge::new());
        let (_sub, mut logs) = events.log_channel();

        pump_stderr(&b"Exception in thread \"main\"\n\tat org.Client.main\n"[..], Arc::clone(&events), 4).await;

        let first = logs.recv().await.unwrap();
        assert_eq!(first.stream, OutputStream::Stderr);
        assert_eq!(first.worker_id, 4);
        assert_eq!(logs.recv().await.unwrap().text, "\tat org.Client.main");
    }

    #[tokio::test]
    async fn oversized_line_is_reported_and_skipped() {
        let events = Arc::new(EventBridge::new());
        let (_d, mut diagnostics) = events.diagnostic_channel();
        let (_l, mut logs) = events.log_channel();
        let router = ChannelRouter::new(2, Arc::clone(&events));

        let mut input = vec![b'x'; sidebridge_core::protocol::DEFAULT_MAX_LINE_LEN + 1];
        input.extend_from_slice(b"\nafter\n");
        pump_stdout(input.as_slice(), router, 2).await;

        assert_eq!(
            diagnostics.recv().await.unwrap(),
            Diagnostic::LineTooLong {
                worker_id: 2,
                stream: OutputStream::Stdout,
                count: 1
            }
        );
        assert_eq!(logs.recv().await.unwrap().text, "after");
        assert!(logs.try_recv().is_err());
    }
}
