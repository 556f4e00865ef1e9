//! Prompt repository trait.

use super::model::{RoleId, RolePrompt, RolePrompts};
use crate::error::Result;

/// Persistence for the two user-editable role prompts.
///
/// Prompts are stored independently from the exchange log and are read fresh
/// for every submission, so an edit only affects exchanges submitted after it.
#[async_trait::async_trait]
pub trait PromptRepository: Send + Sync {
    /// Loads both prompts, substituting the built-in default for any role
    /// that has never been saved.
    async fn load(&self) -> Result<RolePrompts>;

    /// Saves one role's prompt, leaving the other untouched.
    async fn save(&self, prompt: &RolePrompt) -> Result<()>;

    /// Restores the built-in default for the given role.
    async fn reset(&self, role: RoleId) -> Result<()>;
}
