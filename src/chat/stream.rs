use futures::{ Stream, StreamExt };
use log::warn;
use serde::Deserialize;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{ Error, Result };

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Deserialize)]
struct StreamRecord {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Splits a byte stream into lines. A trailing partial line is held until the
/// rest of it arrives, and bytes rather than text are buffered so a UTF-8
/// sequence split across chunks stays intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// Text delta carried by one NDJSON record, if any. Tolerates SSE-style
/// `data:` prefixes and the `[DONE]` sentinel.
pub fn parse_delta(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let data = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamRecord>(data) {
        Ok(record) => {
            let text: String = record.choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .collect();
            if text.is_empty() { None } else { Some(text) }
        }
        Err(e) => {
            warn!("Skipping malformed stream line: {} ({})", data, e);
            None
        }
    }
}

/// Turns a chunked response body into a stream of text deltas.
pub fn delta_stream<S, B, E>(bytes: S) -> DeltaStream
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Into<Error> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut bytes = Box::pin(bytes);
        let mut buffer = LineBuffer::default();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    for line in buffer.push(buf.as_ref()) {
                        if let Some(delta) = parse_delta(&line) {
                            if tx.send(Ok(delta)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            }
        }
        if let Some(delta) = buffer.finish().as_deref().and_then(parse_delta) {
            let _ = tx.send(Ok(delta)).await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
