//! Transcript events and the reducer that turns them into one utterance.

use serde::{Deserialize, Serialize};

/// One recognition result.
///
/// An interim event carries the in-progress text of the current sentence; a
/// final event carries the sentence that was just confirmed, not the whole
/// utterance so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    /// Vendor-reported confidence, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl TranscriptEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence: None,
        }
    }

    pub fn final_segment(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence: None,
        }
    }
}

/// Merges interim and final segments into a single growing utterance.
///
/// `confirmed` is the concatenation of every final segment; `live` is the
/// current interim segment. The visible text is always `confirmed + live`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceAccumulator {
    confirmed: String,
    live: String,
}

impl VoiceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event and returns the resulting visible text.
    pub fn apply(&mut self, event: &TranscriptEvent) -> String {
        if event.is_final {
            self.confirmed.push_str(&event.text);
            self.live.clear();
        } else {
            self.live.clear();
            self.live.push_str(&event.text);
        }
        self.text()
    }

    /// The visible text: confirmed segments followed by the live one.
    pub fn text(&self) -> String {
        format!("{}{}", self.confirmed, self.live)
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty() && self.live.is_empty()
    }

    /// Clears everything; called when a new recording starts.
    pub fn reset(&mut self) {
        self.confirmed.clear();
        self.live.clear();
    }

    /// Returns the visible text and resets, for handing it to a submission.
    pub fn take(&mut self) -> String {
        let text = self.text();
        self.reset();
        text
    }
}
