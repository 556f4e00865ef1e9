//! Role prompts.

pub mod model;
pub mod repository;

pub use model::{RoleId, RolePrompt, RolePrompts};
pub use repository::PromptRepository;
