//! Application layer: conversation and voice use cases built on the domain
//! types, stores and network clients of the lower crates.

pub mod chat_service;
pub mod markdown;
pub mod notification_layer;
pub mod orchestrator;
pub mod provider_registry;
pub mod transcription_session;
pub mod voice_input;

#[cfg(test)]
mod test_support;

pub use chat_service::ChatService;
pub use markdown::{
    BlockKind, HtmlTarget, MarkdownRenderer, RenderStatus, RenderTarget, Span, SpanStyle,
};
pub use notification_layer::{Notification, NotificationLayer};
pub use orchestrator::{DualCompletionOrchestrator, ReplySource, RoleOutcome, SubmitOutcome};
pub use provider_registry::ProviderRegistry;
pub use transcription_session::TranscriptionSession;
pub use voice_input::VoiceInput;
