//! Incremental Server-Sent Events decoder.
//!
//! Bytes arrive in arbitrary chunks; an event is complete at the first blank
//! line. Only `data:` fields are kept (multiple lines joined with `\n`).
//! Comment lines such as keep-alives and events without data are skipped.

use bytes::{Buf, BytesMut};
use serde::Deserialize;
use serde_json::Value;

/// Stream message envelope: `{"type": "snapshot" | "tick", "state": {...}}`.
#[derive(Debug, Deserialize)]
pub struct StreamEnvelope {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub state: Option<Value>,
}

/// Parse an event's data into its state payload.
/// Returns `None` for malformed JSON or a message without state.
pub fn parse_state(data: &str) -> Option<Value> {
    serde_json::from_str::<StreamEnvelope>(data).ok()?.state
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk from the transport.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete event's data, if one is buffered.
    pub fn next_data(&mut self) -> Option<String> {
        loop {
            let (end, separator_len) = find_double_newline(&self.buffer)?;
            let raw = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
            self.buffer.advance(end + separator_len);

            if let Some(data) = parse_sse_data(&raw) {
                return Some(data);
            }
        }
    }
}

/// Position and length of the first event separator.
fn find_double_newline(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_sse_data(raw: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
