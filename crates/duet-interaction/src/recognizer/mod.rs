//! Realtime speech recognition connections.
//!
//! A [`Recognizer`] opens one connection per recording. The connection is a
//! [`RecognitionLink`]: audio and control go in through a command channel,
//! vendor events come out through an event channel. Vendor specifics stay
//! behind this boundary.

mod tencent;

pub use tencent::TencentRecognizer;

use async_trait::async_trait;
use duet_core::error::{DuetError, Result};
use duet_core::speech::{Credentials, RecognitionParams};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LINK_BUFFER: usize = 64;

/// Events reported by a recognition connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Handshake acknowledged by the provider.
    Started { voice_id: String },
    /// The provider detected the start of a sentence.
    SentenceBegin,
    /// Updated interim hypothesis for the current sentence.
    ResultChange {
        text: String,
        confidence: Option<f32>,
    },
    /// The current sentence is confirmed.
    SentenceEnd {
        text: String,
        confidence: Option<f32>,
    },
    /// Recognition of the whole stream has finished.
    Complete { text: Option<String> },
    /// Protocol or transport failure; no further events follow.
    Error(String),
    /// The connection is closed.
    Closed,
}

/// What the session sends to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// One frame of 16 kHz mono PCM16 little-endian audio
    Audio(Vec<u8>),
    /// No more audio; ask the provider to finish and close
    Finish,
}

/// The session-side end of an open recognition connection.
///
/// Dropping the link aborts the tasks driving the connection.
pub struct RecognitionLink {
    commands: mpsc::Sender<LinkCommand>,
    events: mpsc::Receiver<RecognizerEvent>,
    tasks: Vec<JoinHandle<()>>,
}

/// The provider-side end of a [`RecognitionLink`].
pub struct LinkPeer {
    pub commands: mpsc::Receiver<LinkCommand>,
    pub events: mpsc::Sender<RecognizerEvent>,
}

impl RecognitionLink {
    /// Creates a connected link/peer pair.
    pub fn pair() -> (Self, LinkPeer) {
        let (command_tx, command_rx) = mpsc::channel(LINK_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(LINK_BUFFER);
        (
            Self {
                commands: command_tx,
                events: event_rx,
                tasks: Vec::new(),
            },
            LinkPeer {
                commands: command_rx,
                events: event_tx,
            },
        )
    }

    /// Ties background tasks to the link's lifetime.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub async fn send_audio(&self, frame: Vec<u8>) -> Result<()> {
        self.send(LinkCommand::Audio(frame)).await
    }

    /// Signals the end of audio.
    pub async fn finish(&self) -> Result<()> {
        self.send(LinkCommand::Finish).await
    }

    /// Next event, or `None` once the provider side is gone.
    pub async fn next_event(&mut self) -> Option<RecognizerEvent> {
        self.events.recv().await
    }

    async fn send(&self, command: LinkCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DuetError::recognition("Recognition connection is closed"))
    }
}

impl Drop for RecognitionLink {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Opens recognition connections.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Connects using temporary `credentials` and the engine `params`.
    ///
    /// Returns once the transport is open; the provider's acknowledgment
    /// arrives later as [`RecognizerEvent::Started`].
    async fn connect(
        &self,
        credentials: &Credentials,
        params: &RecognitionParams,
    ) -> Result<RecognitionLink>;
}
