//! Speech input domain: credentials, recognition session states and
//! transcript accumulation.

pub mod credentials;
pub mod session;
pub mod transcript;

pub use credentials::{CredentialGrant, Credentials, DEFAULT_REFRESH_MARGIN_MS};
pub use session::{RecognitionParams, RecognitionState, SessionEvent, SessionStatus};
pub use transcript::{TranscriptEvent, VoiceAccumulator};
