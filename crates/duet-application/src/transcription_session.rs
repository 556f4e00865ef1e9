//! Transcription session: one recording at a time, from credentials to the
//! final transcript.
//!
//! The session owns the recognition connection and the audio capture of the
//! current recording. A background pump forwards audio frames, turns
//! recognizer events into [`SessionEvent`]s and publishes them on a broadcast
//! channel, so any number of subscribers can follow along.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use duet_core::config::AppConfig;
use duet_core::error::{DuetError, Result};
use duet_core::speech::{
    RecognitionParams, RecognitionState, SessionEvent, SessionStatus, TranscriptEvent,
};
use duet_interaction::{
    AudioCapture, AudioSource, CredentialProvider, HttpCredentialSource, RecognitionLink,
    Recognizer, RecognizerEvent, TencentRecognizer,
};
use tokio::sync::{Mutex as AsyncMutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const EVENT_CAPACITY: usize = 256;
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on connecting and on the provider's acknowledgment.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Frames held while waiting for the handshake (10 s of audio).
const MAX_BACKLOG_FRAMES: usize = 250;

/// Status and event channel shared with the pump task.
struct Shared {
    status: Mutex<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn status(&self) -> SessionStatus {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn update(&self, f: impl FnOnce(&mut SessionStatus)) {
        match self.status.lock() {
            Ok(mut status) => f(&mut status),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: RecognitionState) {
        self.update(|status| {
            status.state = state;
            status.is_recording = matches!(
                state,
                RecognitionState::Connecting | RecognitionState::Recording | RecognitionState::Stopping
            );
        });
        tracing::debug!("[Transcription] State -> {}", state);
        self.publish(SessionEvent::StateChanged { state });
    }

    fn fail(&self, message: String) {
        tracing::warn!("[Transcription] {}", message);
        self.update(|status| {
            status.state = RecognitionState::Error;
            status.is_recording = false;
            status.is_connected = false;
        });
        self.publish(SessionEvent::StateChanged {
            state: RecognitionState::Error,
        });
        self.publish(SessionEvent::Error { message });
    }
}

/// The pump of the current recording.
struct ActiveRecording {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Drop for ActiveRecording {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Controls speech recognition for the voice input.
pub struct TranscriptionSession {
    credentials: Arc<CredentialProvider>,
    recognizer: Arc<dyn Recognizer>,
    params: RecognitionParams,
    shared: Arc<Shared>,
    active: AsyncMutex<Option<ActiveRecording>>,
    close_timeout: Duration,
    connect_timeout: Duration,
}

impl TranscriptionSession {
    pub fn new(
        credentials: Arc<CredentialProvider>,
        recognizer: Arc<dyn Recognizer>,
        params: RecognitionParams,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            credentials,
            recognizer,
            params,
            shared: Arc::new(Shared {
                status: Mutex::new(SessionStatus::default()),
                events,
            }),
            active: AsyncMutex::new(None),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Builds a session against the configured trust server and the Tencent
    /// realtime recognizer.
    pub fn from_config(config: &AppConfig) -> Self {
        let speech = &config.speech;
        let source = HttpCredentialSource::new(
            config.trust_server_url(),
            Duration::from_secs(speech.request_timeout_secs),
        );
        let credentials =
            CredentialProvider::new(Arc::new(source)).with_margin_ms(speech.refresh_margin_ms());
        let connect_timeout = Duration::from_secs(speech.connect_timeout_secs);
        let recognizer =
            TencentRecognizer::new(speech.endpoint_host.clone()).with_connect_timeout(connect_timeout);
        Self::new(Arc::new(credentials), Arc::new(recognizer), speech.params.clone())
            .with_connect_timeout(connect_timeout)
    }

    /// How long connecting, and then the provider's acknowledgment, may take.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How long `stop()` waits for the provider to confirm closure.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Starts a recording from `source`.
    ///
    /// Returns once the connection is open and audio is flowing; the
    /// provider's acknowledgment moves the session to `recording` later.
    /// Fails with `Busy` while another recording is active. Credential,
    /// connection and capture failures leave the session in `error`.
    pub async fn start(&self, source: &dyn AudioSource) -> Result<()> {
        let mut active = self.active.lock().await;
        let state = self.shared.status().state;
        if !state.can_start() {
            return Err(DuetError::Busy(format!("Recording is {state}")));
        }
        // A previous pump has already released its connection; reap it.
        drop(active.take());

        self.shared.update(|status| status.voice_id = None);
        self.shared.set_state(RecognitionState::Connecting);
        tracing::info!("[Transcription] Starting from {}", source.describe());

        let credentials = match self.credentials.get_valid().await {
            Ok(credentials) => credentials,
            Err(e) => return Err(self.abort_start(e)),
        };
        let connecting = self.recognizer.connect(&credentials, &self.params);
        let link = match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => return Err(self.abort_start(e)),
            Err(_) => {
                let e = DuetError::recognition(format!(
                    "Connecting to the recognizer timed out after {:?}",
                    self.connect_timeout
                ));
                return Err(self.abort_start(e));
            }
        };
        let capture = match source.start().await {
            Ok(capture) => capture,
            Err(e) => {
                drop(link);
                return Err(self.abort_start(e));
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let pump = Pump {
            link,
            capture,
            shared: self.shared.clone(),
            close_timeout: self.close_timeout,
            handshake_timeout: self.connect_timeout,
        };
        *active = Some(ActiveRecording {
            stop: Some(stop_tx),
            task: tokio::spawn(pump.run(stop_rx)),
        });
        Ok(())
    }

    /// Stops the current recording and waits until it has wound down.
    ///
    /// Returns `false` when there was nothing to stop.
    pub async fn stop(&self) -> Result<bool> {
        let mut active = self.active.lock().await;
        if !self.shared.status().state.can_stop() {
            return Ok(false);
        }
        let Some(mut recording) = active.take() else {
            return Ok(false);
        };

        tracing::info!("[Transcription] Stopping");
        if let Some(stop) = recording.stop.take() {
            let _ = stop.send(());
        }
        match (&mut recording.task).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_cancelled() => Ok(true),
            Err(e) => Err(DuetError::internal(format!("Transcription task failed: {e}"))),
        }
    }

    fn abort_start(&self, error: DuetError) -> DuetError {
        self.shared.fail(error.to_string());
        error
    }
}

enum PumpEnd {
    Closed,
    Failed(String),
}

/// Drives one recording until the connection closes or fails.
struct Pump {
    link: RecognitionLink,
    capture: AudioCapture,
    shared: Arc<Shared>,
    close_timeout: Duration,
    handshake_timeout: Duration,
}

impl Pump {
    async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) {
        let mut acknowledged = false;
        let mut stopping = false;
        let mut audio_open = true;
        let mut backlog: VecDeque<Vec<u8>> = VecDeque::new();
        let mut pending: Option<String> = None;

        let deadline = tokio::time::sleep(self.close_timeout);
        tokio::pin!(deadline);
        let handshake = tokio::time::sleep(self.handshake_timeout);
        tokio::pin!(handshake);

        let end = loop {
            tokio::select! {
                _ = &mut stop_rx, if !stopping => {
                    stopping = true;
                    self.shared.set_state(RecognitionState::Stopping);
                    self.capture.stop();
                    deadline.as_mut().reset(Instant::now() + self.close_timeout);
                }
                frame = self.capture.next_frame(), if audio_open => match frame {
                    Some(frame) if acknowledged => {
                        if let Err(e) = self.link.send_audio(frame).await {
                            break PumpEnd::Failed(e.to_string());
                        }
                    }
                    Some(frame) => {
                        if backlog.len() == MAX_BACKLOG_FRAMES {
                            backlog.pop_front();
                        }
                        backlog.push_back(frame);
                    }
                    None => {
                        audio_open = false;
                        if acknowledged {
                            if let Err(e) = self.link.finish().await {
                                break PumpEnd::Failed(e.to_string());
                            }
                        }
                    }
                },
                event = self.link.next_event() => match event {
                    Some(RecognizerEvent::Started { voice_id }) => {
                        acknowledged = true;
                        self.shared.update(|status| {
                            status.is_connected = true;
                            status.voice_id = Some(voice_id.clone());
                        });
                        if !stopping {
                            self.shared.set_state(RecognitionState::Recording);
                        }
                        tracing::info!("[Transcription] Recognition started voice_id={}", voice_id);
                        self.shared.publish(SessionEvent::Started { voice_id });
                        if let Err(e) = self.drain_backlog(&mut backlog, audio_open).await {
                            break PumpEnd::Failed(e.to_string());
                        }
                    }
                    Some(RecognizerEvent::SentenceBegin) => {}
                    Some(RecognizerEvent::ResultChange { text, confidence }) => {
                        pending = Some(text.clone());
                        self.publish_transcript(text, false, confidence);
                    }
                    Some(RecognizerEvent::SentenceEnd { text, confidence }) => {
                        pending = None;
                        self.publish_transcript(text, true, confidence);
                    }
                    Some(RecognizerEvent::Complete { text }) => {
                        if let Some(interim) = pending.take() {
                            self.publish_transcript(text.unwrap_or(interim), true, None);
                        }
                    }
                    Some(RecognizerEvent::Error(message)) => break PumpEnd::Failed(message),
                    Some(RecognizerEvent::Closed) | None => {
                        if stopping || !audio_open {
                            break PumpEnd::Closed;
                        }
                        break PumpEnd::Failed("Recognition connection closed unexpectedly".to_string());
                    }
                },
                _ = &mut handshake, if !acknowledged && !stopping => {
                    break PumpEnd::Failed(format!(
                        "No acknowledgment from the recognizer within {:?}",
                        self.handshake_timeout
                    ));
                }
                _ = &mut deadline, if stopping => {
                    tracing::warn!("[Transcription] No close confirmation within {:?}", self.close_timeout);
                    break PumpEnd::Closed;
                }
            }
        };

        let Pump {
            link,
            capture,
            shared,
            ..
        } = self;
        drop(link);
        drop(capture);

        match end {
            PumpEnd::Closed => {
                // What was heard of the unfinished sentence still counts.
                if let Some(interim) = pending {
                    shared.publish(SessionEvent::Transcript(TranscriptEvent::final_segment(interim)));
                }
                shared.update(|status| {
                    status.is_connected = false;
                    status.voice_id = None;
                });
                shared.publish(SessionEvent::Stopped);
                shared.set_state(RecognitionState::Idle);
                tracing::info!("[Transcription] Stopped");
            }
            PumpEnd::Failed(message) => shared.fail(message),
        }
    }

    /// Sends audio captured before the handshake, then the end marker if
    /// the source has already finished.
    async fn drain_backlog(&self, backlog: &mut VecDeque<Vec<u8>>, audio_open: bool) -> Result<()> {
        while let Some(frame) = backlog.pop_front() {
            self.link.send_audio(frame).await?;
        }
        if !audio_open {
            self.link.finish().await?;
        }
        Ok(())
    }

    fn publish_transcript(&self, text: String, is_final: bool, confidence: Option<f32>) {
        self.shared.publish(SessionEvent::Transcript(TranscriptEvent {
            text,
            is_final,
            confidence,
        }));
    }
}
