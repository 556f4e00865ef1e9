//! Conversation exchanges and the per-role request context built from them.

pub mod context;
pub mod model;
pub mod repository;

pub use context::{CompletionRequest, DEFAULT_CONTEXT_LIMIT};
pub use model::{ChatMessage, ConversationExchange, MessageRole};
pub use repository::ExchangeRepository;
