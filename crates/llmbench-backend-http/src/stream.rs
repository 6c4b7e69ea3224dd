use llmbench_backend::{ChatStream, StreamEvent};
use llmbench_common::Result;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use crate::http_error;

/// Splits a byte stream into lines. Bytes are held until a newline so a
/// multi-byte character split across reads decodes intact.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            lines.push(text.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Whatever followed the last newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buf)).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Payload of an SSE `data:` line. Other fields and comments yield `None`.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Reads the body on a background task and parses it line by line. The
/// first parse error ends the stream after being delivered.
pub(crate) fn spawn_line_reader<P>(resp: reqwest::Response, mut parse: P) -> ChatStream
where
    P: FnMut(&str) -> Result<Vec<StreamEvent>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut body = Box::pin(resp.bytes_stream());
        let mut lines = LineBuffer::default();
        while let Some(next) = body.next().await {
            let bytes = match next {
                Ok(b) => b,
                Err(e) => {
                    let _ = tx.send(Err(http_error(e))).await;
                    return;
                }
            };
            for line in lines.push(&bytes) {
                if !forward(&tx, &mut parse, &line).await { return; }
            }
        }
        if let Some(line) = lines.finish() {
            forward(&tx, &mut parse, &line).await;
        }
    });
    Box::pin(ReceiverStream::new(rx))
}

async fn forward<P>(tx: &mpsc::Sender<Result<StreamEvent>>, parse: &mut P, line: &str) -> bool
where
    P: FnMut(&str) -> Result<Vec<StreamEvent>>,
{
    if line.trim().is_empty() { return true; }
    match parse(line) {
        Ok(events) => {
            for ev in events {
                if tx.send(Ok(ev)).await.is_err() { return false; }
            }
            true
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

/// A finished non-streaming response presented as a stream.
pub(crate) fn single_shot(events: Vec<StreamEvent>) -> ChatStream {
    Box::pin(tokio_stream::iter(events.into_iter().map(Ok)))
}
