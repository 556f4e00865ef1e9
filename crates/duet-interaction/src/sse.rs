//! Server-sent-events decoding for completion streams.
//!
//! The gateway writes newline-delimited `data: <json>` frames and finishes
//! with `data: [DONE]`. Network chunks can split a frame (or a multi-byte
//! character) anywhere, so the decoder buffers raw bytes and only decodes
//! complete lines.

use serde::Deserialize;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// A meaningful frame extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Non-empty incremental text.
    Delta(String),
    /// The `[DONE]` terminator.
    Done,
    /// The gateway reported an upstream failure inside the stream.
    Error(String),
}

/// Incremental frame splitter that holds the trailing partial line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    skipped: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk and returns the events of every line it
    /// completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.pending);
        self.decode_line(&rest).into_iter().collect()
    }

    /// Number of `data:` frames dropped because they could not be parsed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        let payload = line.strip_prefix(DATA_PREFIX)?.trim();

        if payload.is_empty() {
            return None;
        }
        if payload == DONE_MARKER {
            return Some(SseEvent::Done);
        }

        match serde_json::from_str::<StreamFrame>(payload) {
            Ok(frame) => frame.into_event(),
            Err(err) => {
                // Tolerated: a malformed frame never aborts the stream.
                self.skipped += 1;
                tracing::debug!("[SSE] Skipping unparseable frame ({}): {}", err, payload);
                None
            }
        }
    }
}

#[derive(Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl StreamFrame {
    fn into_event(self) -> Option<SseEvent> {
        if let Some(error) = self.error {
            let message = match error {
                serde_json::Value::String(text) => text,
                serde_json::Value::Object(ref map) => map
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
                other => other.to_string(),
            };
            return Some(SseEvent::Error(message));
        }

        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|text| !text.is_empty())
            .map(SseEvent::Delta)
    }
}
