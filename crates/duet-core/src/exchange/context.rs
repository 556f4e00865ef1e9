//! Per-role request context.
//!
//! Each role sees only its own side of the conversation: the user's turns
//! paired with that role's replies. The other role's replies never leak into
//! the payload.

use serde::{Deserialize, Serialize};

use super::model::{ChatMessage, ConversationExchange};
use crate::prompt::{RoleId, RolePrompt};

/// Default number of prior exchanges carried in a request.
pub const DEFAULT_CONTEXT_LIMIT: usize = 10;

/// A fully built chat-completion request for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub role_id: RoleId,
    /// Ordered turns: system prompt, bounded history, new user turn
    pub messages: Vec<ChatMessage>,
    pub streaming: bool,
}

impl CompletionRequest {
    /// Builds the bounded payload for `prompt.role_id`.
    ///
    /// Exchanges where this role has no reply (it failed or the entry was
    /// imported without one) are skipped, so the window always consists of
    /// complete user/assistant pairs. At most `limit` pairs are kept, taken
    /// from the most recent end of `history`.
    ///
    /// # Arguments
    ///
    /// * `prompt` - The role's system prompt as currently edited
    /// * `history` - The exchange log in chronological order
    /// * `limit` - Maximum number of prior pairs
    /// * `user_input` - The utterance being submitted
    pub fn for_role(
        prompt: &RolePrompt,
        history: &[ConversationExchange],
        limit: usize,
        user_input: &str,
    ) -> Self {
        let role = prompt.role_id;
        let pairs: Vec<&ConversationExchange> = history
            .iter()
            .rev()
            .filter(|exchange| !exchange.reply(role).trim().is_empty())
            .take(limit)
            .collect();

        let mut messages = Vec::with_capacity(pairs.len() * 2 + 2);
        messages.push(ChatMessage::system(prompt.system_text.clone()));
        for exchange in pairs.into_iter().rev() {
            messages.push(ChatMessage::user(exchange.user_input.clone()));
            messages.push(ChatMessage::assistant(exchange.reply(role).to_string()));
        }
        messages.push(ChatMessage::user(user_input.to_string()));

        Self {
            role_id: role,
            messages,
            streaming: true,
        }
    }

    /// Returns the same payload with streaming disabled, for the fallback call.
    pub fn without_streaming(&self) -> Self {
        Self {
            streaming: false,
            ..self.clone()
        }
    }

    /// Number of prior user/assistant pairs carried by this request.
    pub fn history_pairs(&self) -> usize {
        self.messages.len().saturating_sub(2) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MessageRole;

    fn history(count: usize) -> Vec<ConversationExchange> {
        (0..count)
            .map(|i| {
                ConversationExchange::new(
                    format!("utterance {i}"),
                    format!("reply a {i}"),
                    format!("reply b {i}"),
                )
            })
            .collect()
    }

    #[test]
    fn test_history_is_bounded_to_most_recent() {
        let prompt = RolePrompt::new(RoleId::A, "Be a friendly partner.");
        let request = CompletionRequest::for_role(&prompt, &history(12), 10, "New sentence");

        // system + 10 pairs + new user turn
        assert_eq!(request.messages.len(), 22);
        assert_eq!(request.history_pairs(), 10);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[1].content, "utterance 2");
        assert_eq!(request.messages[2].content, "reply a 2");
        assert_eq!(request.messages[20].content, "reply a 11");

        let last = request.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::User);
        assert_eq!(last.content, "New sentence");
    }

    #[test]
    fn test_role_sees_only_its_own_replies() {
        let prompt = RolePrompt::new(RoleId::B, "Rewrite natively.");
        let request = CompletionRequest::for_role(&prompt, &history(2), 10, "x");

        assert!(
            request
                .messages
                .iter()
                .filter(|m| m.role == MessageRole::Assistant)
                .all(|m| m.content.starts_with("reply b"))
        );
    }

    #[test]
    fn test_exchanges_without_role_reply_are_skipped() {
        let mut log = history(3);
        log[1].reply_a.clear();

        let prompt = RolePrompt::new(RoleId::A, "sys");
        let request = CompletionRequest::for_role(&prompt, &log, 10, "x");

        assert_eq!(request.history_pairs(), 2);
        assert!(request.messages.iter().all(|m| m.content != "utterance 1"));
    }

    #[test]
    fn test_fallback_copy_disables_streaming_only() {
        let prompt = RolePrompt::new(RoleId::A, "sys");
        let request = CompletionRequest::for_role(&prompt, &history(1), 10, "x");
        let fallback = request.without_streaming();

        assert!(request.streaming);
        assert!(!fallback.streaming);
        assert_eq!(request.messages, fallback.messages);
    }
}
