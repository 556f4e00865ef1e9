//! Exchange domain model.
//!
//! An exchange is one user utterance together with the replies of both roles.

use serde::{Deserialize, Serialize};

use crate::prompt::RoleId;

/// Role of a single chat message sent to the completion gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single `{role, content}` turn in a completion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// One finished exchange as it is stored in the history log.
///
/// Exchanges are immutable once appended. The serialized field names follow
/// the browser storage format; `agent1Response` / `agent2Response` are
/// accepted as aliases so histories exported from the web page load as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationExchange {
    /// Creation time (RFC 3339 for exchanges created here; free-form for imports)
    pub timestamp: String,
    /// The user's utterance
    pub user_input: String,
    /// Reply of the conversational role (empty when that role failed)
    #[serde(alias = "agent1Response", default)]
    pub reply_a: String,
    /// Reply of the rewriting role (empty when that role failed)
    #[serde(alias = "agent2Response", default)]
    pub reply_b: String,
}

impl ConversationExchange {
    /// Creates an exchange stamped with the current time.
    pub fn new(
        user_input: impl Into<String>,
        reply_a: impl Into<String>,
        reply_b: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_input: user_input.into(),
            reply_a: reply_a.into(),
            reply_b: reply_b.into(),
        }
    }

    /// Returns the reply recorded for the given role.
    pub fn reply(&self, role: RoleId) -> &str {
        match role {
            RoleId::A => &self.reply_a,
            RoleId::B => &self.reply_b,
        }
    }

    /// Whether at least one role produced non-empty text.
    ///
    /// Only exchanges for which this holds are appended to the history.
    pub fn has_reply(&self) -> bool {
        !self.reply_a.trim().is_empty() || !self.reply_b.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_browser_field_names() {
        let exchange = ConversationExchange {
            timestamp: "2024-05-01T10:00:00Z".to_string(),
            user_input: "Hi".to_string(),
            reply_a: "Hello!".to_string(),
            reply_b: "Hi.".to_string(),
        };

        let json = serde_json::to_value(&exchange).unwrap();
        assert_eq!(json["userInput"], "Hi");
        assert_eq!(json["replyA"], "Hello!");
        assert_eq!(json["replyB"], "Hi.");
    }

    #[test]
    fn test_accepts_legacy_agent_keys() {
        let json = r#"{
            "timestamp": "2024/5/1 10:00:00",
            "userInput": "I are go to school yesterday",
            "agent1Response": "Oh, how was school?",
            "agent2Response": "I went to school yesterday."
        }"#;

        let exchange: ConversationExchange = serde_json::from_str(json).unwrap();
        assert_eq!(exchange.reply(RoleId::A), "Oh, how was school?");
        assert_eq!(exchange.reply(RoleId::B), "I went to school yesterday.");
    }

    #[test]
    fn test_has_reply() {
        assert!(ConversationExchange::new("hi", "", "Hi.").has_reply());
        assert!(!ConversationExchange::new("hi", " ", "").has_reply());
    }

    #[test]
    fn test_message_role_wire_names() {
        let json = serde_json::to_string(&ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
