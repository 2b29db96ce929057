//! Server-sent events plumbing shared by the HTTP adapters.
//!
//! Each adapter supplies an [`SseDecoder`] that turns one `data:` payload into
//! zero or more [`StreamEvent`]s; [`spawn_sse_pump`] drives the HTTP byte
//! stream through it on a background task and forwards events to a channel.

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{classify_error_message, EventStream, StreamEvent};

/// Channel capacity between the pump task and the consuming loop.
const EVENT_BUFFER: usize = 64;

/// Dialect-specific decoding of SSE payloads.
pub(crate) trait SseDecoder: Send + 'static {
    /// Decode one `data:` payload.
    fn decode(&mut self, data: &str) -> Vec<StreamEvent>;

    /// Events to emit when the byte stream ends.
    fn finish(&mut self) -> Vec<StreamEvent>;
}

/// Splits a byte stream into complete lines.
///
/// Bytes are buffered until a newline arrives, so multi-byte characters cut
/// across chunk boundaries decode correctly.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the `data:` payloads it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = data_payload(line.trim()) {
                payloads.push(data.to_string());
            }
        }
        payloads
    }

    /// Flush a trailing line that had no newline.
    pub(crate) fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest);
        data_payload(line.trim()).map(str::to_string)
    }
}

fn data_payload(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    let data = data.trim_start();
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

/// Drive `bytes` through `decoder` on a background task.
///
/// The task stops early when the receiver is dropped, which also drops the
/// HTTP response and closes the connection.
pub(crate) fn spawn_sse_pump<S, B, E, D>(bytes: S, mut decoder: D) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    D: SseDecoder,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        let mut lines = SseLineBuffer::new();
        tokio::pin!(bytes);

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Stream read error");
                    let err = classify_error_message(&format!("Stream read error: {}", e));
                    let _ = tx.send(StreamEvent::Error(err)).await;
                    return;
                }
            };

            for data in lines.push(chunk.as_ref()) {
                for event in decoder.decode(&data) {
                    if tx.send(event).await.is_err() {
                        debug!("Stream receiver dropped; stopping");
                        return;
                    }
                }
            }
        }

        let tail = lines.flush();
        let mut events: Vec<StreamEvent> = tail
            .map(|data| decoder.decode(&data))
            .unwrap_or_default();
        events.extend(decoder.finish());
        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_splits_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"event: ping\ndata: {\"a\":").is_empty());
        let payloads = buffer.push(b"1}\n\ndata: [DONE]\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn test_line_buffer_handles_split_utf8() {
        let mut buffer = SseLineBuffer::new();
        let text = "data: héllo\n".as_bytes();
        // Split inside the two-byte 'é'.
        let (a, b) = text.split_at(8);
        assert!(buffer.push(a).is_empty());
        assert_eq!(buffer.push(b), vec!["héllo"]);
    }

    #[test]
    fn test_line_buffer_accepts_no_space_and_crlf() {
        let mut buffer = SseLineBuffer::new();
        assert_eq!(buffer.push(b"data:{}\r\n"), vec!["{}"]);
    }

    #[test]
    fn test_flush_trailing_line() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: tail").is_empty());
        assert_eq!(buffer.flush().as_deref(), Some("tail"));
        assert!(buffer.flush().is_none());
    }

    struct Upper;

    impl SseDecoder for Upper {
        fn decode(&mut self, data: &str) -> Vec<StreamEvent> {
            vec![StreamEvent::TextDelta(data.to_uppercase())]
        }
        fn finish(&mut self) -> Vec<StreamEvent> {
            vec![StreamEvent::Done { stop_reason: None }]
        }
    }

    #[tokio::test]
    async fn test_pump_forwards_events_then_finish() {
        let chunks: Vec<std::result::Result<&'static [u8], String>> = vec![
            Ok(b"data: ab\n".as_slice()),
            Ok(b"data: cd\n".as_slice()),
        ];
        let mut rx = spawn_sse_pump(futures::stream::iter(chunks), Upper);

        assert_eq!(rx.recv().await, Some(StreamEvent::TextDelta("AB".into())));
        assert_eq!(rx.recv().await, Some(StreamEvent::TextDelta("CD".into())));
        assert_eq!(rx.recv().await, Some(StreamEvent::Done { stop_reason: None }));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_pump_reports_read_errors() {
        let chunks: Vec<std::result::Result<&'static [u8], String>> = vec![
            Ok(b"data: ok\n".as_slice()),
            Err("connection reset".to_string()),
        ];
        let mut rx = spawn_sse_pump(futures::stream::iter(chunks), Upper);

        assert_eq!(rx.recv().await, Some(StreamEvent::TextDelta("OK".into())));
        match rx.recv().await {
            Some(StreamEvent::Error(err)) => assert!(err.message().contains("connection reset")),
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(rx.recv().await, None);
    }
}
