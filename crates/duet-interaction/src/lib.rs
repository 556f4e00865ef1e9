pub mod audio;
pub mod completion_gateway;
pub mod credential_provider;
pub mod recognizer;
pub mod sse;

pub use audio::{AudioCapture, AudioSource, WavFileSource};
pub use completion_gateway::{CompletionGateway, CompletionStream, HttpCompletionGateway};
pub use credential_provider::{
    CredentialProvider, CredentialSource, HttpCredentialSource, hmac_sha1_base64,
};
pub use recognizer::{
    RecognitionLink, Recognizer, RecognizerEvent, TencentRecognizer,
};
pub use sse::{SseDecoder, SseEvent};

#[cfg(feature = "microphone")]
pub use audio::MicrophoneSource;
