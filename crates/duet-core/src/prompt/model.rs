//! Role prompt domain model.
//!
//! Two roles answer every utterance: role A keeps the conversation going,
//! role B rewrites the user's sentence the way a native speaker would say it.

use serde::{Deserialize, Serialize};

const DEFAULT_PARTNER_PROMPT: &str = "You are a friendly English conversation partner. Talk with the user naturally in English.
- Adapt your replies to the user's level of English
- Keep the conversation coherent and engaging
- Ask questions to keep the conversation going
- Use concise but rich language

Reply to the user's message directly in English.";

const DEFAULT_REWRITER_PROMPT: &str = "Role: You are a professional English expression refinement assistant.
Task: When given a sentence written by a non-native English learner, correct and improve the sentence to make it sound as natural, fluent, and native-like as possible. Your goal is not only to fix grammar or spelling mistakes, but also to enhance word choice, phrasing, and tone to match how a native speaker would naturally express the idea.
If the original sentence is already clear, natural, and native-like, you may leave it unchanged.
Output Format: Return only the improved sentence without any explanations, comments, or analysis.
Important Rules:
1. Make the sentence sound fluent, natural, and idiomatic, like something a native speaker would actually say or write.
2. Correct grammar, spelling, phrasing, and awkward or unnatural expressions.
3. Do not add extra information or remove essential meaning from the original sentence.
4. If the original sentence is perfectly fine for a native speaker to understand and use naturally, leave it unchanged.
5. Output only the corrected (or original) sentence. No additional text.";

/// Identifies one of the two completion roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleId {
    /// Conversational partner
    A,
    /// Native-expression rewriter
    B,
}

impl RoleId {
    /// Both roles in display order.
    pub const ALL: [RoleId; 2] = [RoleId::A, RoleId::B];

    /// Human-readable label used in the UI.
    pub fn label(self) -> &'static str {
        match self {
            RoleId::A => "Conversation partner",
            RoleId::B => "Native rewriter",
        }
    }

    /// Inline marker rendered when both the stream and the fallback failed.
    pub fn failure_marker(self) -> String {
        format!("❌ {} failed to respond", self.label())
    }

    /// Parses `a`/`b` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "a" => Some(RoleId::A),
            "b" => Some(RoleId::B),
            _ => None,
        }
    }

    /// Returns the built-in system prompt for this role.
    pub fn default_prompt(self) -> &'static str {
        match self {
            RoleId::A => DEFAULT_PARTNER_PROMPT,
            RoleId::B => DEFAULT_REWRITER_PROMPT,
        }
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleId::A => write!(f, "A"),
            RoleId::B => write!(f, "B"),
        }
    }
}

/// A user-editable system prompt for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePrompt {
    pub role_id: RoleId,
    pub system_text: String,
}

impl RolePrompt {
    pub fn new(role_id: RoleId, system_text: impl Into<String>) -> Self {
        Self {
            role_id,
            system_text: system_text.into(),
        }
    }

    /// The built-in prompt for `role_id`.
    pub fn default_for(role_id: RoleId) -> Self {
        Self::new(role_id, role_id.default_prompt())
    }
}

/// The pair of prompts supplied to one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePrompts {
    pub a: RolePrompt,
    pub b: RolePrompt,
}

impl RolePrompts {
    pub fn get(&self, role: RoleId) -> &RolePrompt {
        match role {
            RoleId::A => &self.a,
            RoleId::B => &self.b,
        }
    }

    /// Replaces the prompt of `prompt.role_id`.
    pub fn set(&mut self, prompt: RolePrompt) {
        match prompt.role_id {
            RoleId::A => self.a = prompt,
            RoleId::B => self.b = prompt,
        }
    }
}

impl Default for RolePrompts {
    fn default() -> Self {
        Self {
            a: RolePrompt::default_for(RoleId::A),
            b: RolePrompt::default_for(RoleId::B),
        }
    }
}
