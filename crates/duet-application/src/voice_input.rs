//! The voice input field.
//!
//! Folds session events into the text shown in the input box and hands the
//! utterance over to a submission.

use std::sync::{Arc, Mutex};

use duet_core::speech::{SessionEvent, VoiceAccumulator};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Owns the accumulated utterance of the current or last recording.
pub struct VoiceInput {
    accumulator: Mutex<VoiceAccumulator>,
    text: watch::Sender<String>,
}

impl Default for VoiceInput {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceInput {
    pub fn new() -> Self {
        let (text, _) = watch::channel(String::new());
        Self {
            accumulator: Mutex::new(VoiceAccumulator::new()),
            text,
        }
    }

    /// Applies one session event. A new recording clears the previous text.
    pub fn apply(&self, event: &SessionEvent) {
        let text = self.with_accumulator(|accumulator| match event {
            SessionEvent::Started { .. } => {
                accumulator.reset();
                Some(String::new())
            }
            SessionEvent::Transcript(transcript) => Some(accumulator.apply(transcript)),
            _ => None,
        });
        if let Some(text) = text {
            self.text.send_replace(text);
        }
    }

    /// The visible text.
    pub fn text(&self) -> String {
        self.with_accumulator(|accumulator| accumulator.text())
    }

    /// Follows the visible text as it changes.
    pub fn watch(&self) -> watch::Receiver<String> {
        self.text.subscribe()
    }

    /// Hands the utterance over and clears the field.
    pub fn take(&self) -> String {
        let text = self.with_accumulator(VoiceAccumulator::take);
        self.text.send_replace(String::new());
        text
    }

    /// Applies events from `events` until the session goes away.
    pub fn attach(self: &Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        let input = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => input.apply(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("[Voice] Missed {} session event(s)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn with_accumulator<T>(&self, f: impl FnOnce(&mut VoiceAccumulator) -> T) -> T {
        match self.accumulator.lock() {
            Ok(mut accumulator) => f(&mut accumulator),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use duet_core::speech::TranscriptEvent;

    use super::*;

    #[test]
    fn test_interim_and_final_segments() {
        let input = VoiceInput::new();
        let mut seen = Vec::new();
        for event in [
            TranscriptEvent::interim("He"),
            TranscriptEvent::final_segment("Hello"),
            TranscriptEvent::interim(" world"),
        ] {
            input.apply(&SessionEvent::Transcript(event));
            seen.push(input.text());
        }

        assert_eq!(seen, vec!["He", "Hello", "Hello world"]);
    }

    #[test]
    fn test_new_recording_resets() {
        let input = VoiceInput::new();
        input.apply(&SessionEvent::Transcript(TranscriptEvent::final_segment("Old.")));
        input.apply(&SessionEvent::Started {
            voice_id: "v2".to_string(),
        });

        assert_eq!(input.text(), "");
    }

    #[test]
    fn test_take_hands_over_and_clears() {
        let input = VoiceInput::new();
        let watcher = input.watch();
        input.apply(&SessionEvent::Transcript(TranscriptEvent::final_segment("I went.")));
        assert_eq!(*watcher.borrow(), "I went.");

        assert_eq!(input.take(), "I went.");
        assert_eq!(input.text(), "");
        assert_eq!(*watcher.borrow(), "");
    }

    #[tokio::test]
    async fn test_attach_follows_session_events() {
        let (tx, rx) = broadcast::channel(8);
        let input = Arc::new(VoiceInput::new());
        let task = input.attach(rx);

        tx.send(SessionEvent::Transcript(TranscriptEvent::interim("Hi"))).unwrap();
        tx.send(SessionEvent::Stopped).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(input.text(), "Hi");
    }
}
