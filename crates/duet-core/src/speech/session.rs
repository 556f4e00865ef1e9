//! Recognition session states, events and parameters.

use serde::{Deserialize, Serialize};

use super::transcript::TranscriptEvent;

/// Lifecycle of a transcription session.
///
/// `Idle → Connecting → Recording → Stopping → Idle`, with `Error` reachable
/// from every non-idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionState {
    Idle,
    Connecting,
    Recording,
    Stopping,
    Error,
}

impl RecognitionState {
    /// Whether a new session may be started from this state.
    ///
    /// `Error` is only entered after the connection has been released, so it
    /// accepts a new start just like `Idle`.
    pub fn can_start(self) -> bool {
        matches!(self, RecognitionState::Idle | RecognitionState::Error)
    }

    /// Whether `stop()` has anything to stop.
    pub fn can_stop(self) -> bool {
        matches!(self, RecognitionState::Connecting | RecognitionState::Recording)
    }
}

impl std::fmt::Display for RecognitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecognitionState::Idle => "idle",
            RecognitionState::Connecting => "connecting",
            RecognitionState::Recording => "recording",
            RecognitionState::Stopping => "stopping",
            RecognitionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Events published by a transcription session to its subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session moved to a new state.
    StateChanged { state: RecognitionState },
    /// The provider acknowledged the connection; audio is being recognized.
    Started { voice_id: String },
    /// An interim or final transcript segment.
    Transcript(TranscriptEvent),
    /// The connection confirmed closure after a stop request.
    Stopped,
    /// A transport, protocol or credential failure.
    Error { message: String },
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: RecognitionState,
    pub is_recording: bool,
    pub is_connected: bool,
    pub voice_id: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: RecognitionState::Idle,
            is_recording: false,
            is_connected: false,
            voice_id: None,
        }
    }
}

/// Recognition engine parameters sent when a connection is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionParams {
    /// Engine model, e.g. `16k_en` or `16k_zh`
    pub engine_model_type: String,
    /// 1 = PCM
    pub voice_format: u8,
    /// Voice activity detection (1 = on)
    pub needvad: u8,
    pub filter_dirty: u8,
    /// Filler-word filtering (0 off, 1 partial, 2 strict)
    pub filter_modal: u8,
    /// 0 keeps punctuation
    pub filter_punc: u8,
    pub convert_num_mode: u8,
    pub word_info: u8,
}

impl Default for RecognitionParams {
    fn default() -> Self {
        Self {
            engine_model_type: "16k_en".to_string(),
            voice_format: 1,
            needvad: 1,
            filter_dirty: 1,
            filter_modal: 2,
            filter_punc: 0,
            convert_num_mode: 1,
            word_info: 2,
        }
    }
}

impl RecognitionParams {
    /// Parameters as `(name, value)` pairs for the connection query string.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("engine_model_type", self.engine_model_type.clone()),
            ("voice_format", self.voice_format.to_string()),
            ("needvad", self.needvad.to_string()),
            ("filter_dirty", self.filter_dirty.to_string()),
            ("filter_modal", self.filter_modal.to_string()),
            ("filter_punc", self.filter_punc.to_string()),
            ("convert_num_mode", self.convert_num_mode.to_string()),
            ("word_info", self.word_info.to_string()),
        ]
    }
}
