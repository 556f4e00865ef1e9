//! Slash commands understood by the REPL.

use std::path::PathBuf;

use duet_core::prompt::RoleId;

/// Every command name, for completion and hints.
pub const COMMAND_NAMES: &[&str] = &[
    "/voice",
    "/prompts",
    "/prompt",
    "/history",
    "/clear",
    "/providers",
    "/provider",
    "/status",
    "/help",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Record an utterance, from a WAV file when a path is given
    Voice(Option<PathBuf>),
    /// Show both role prompts
    Prompts,
    /// Replace one role's prompt
    SetPrompt(RoleId, String),
    /// Restore the built-in prompt for one role, or both
    ResetPrompts(Option<RoleId>),
    History,
    Clear,
    Providers,
    Provider(String),
    Status,
    Help,
    /// Something that looks like a command but isn't one
    Unknown(String),
}

impl Command {
    /// Parses a line starting with `/`. Anything else is chat input.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let command = match name {
            "/voice" if rest.is_empty() => Command::Voice(None),
            "/voice" => Command::Voice(Some(PathBuf::from(rest))),
            "/prompts" if rest.is_empty() => Command::Prompts,
            "/prompts" => match rest.split_once(char::is_whitespace) {
                _ if rest == "reset" => Command::ResetPrompts(None),
                Some(("reset", role)) => match RoleId::parse(role) {
                    Some(role) => Command::ResetPrompts(Some(role)),
                    None => Command::Unknown(line.to_string()),
                },
                _ => Command::Unknown(line.to_string()),
            },
            "/prompt" => match rest.split_once(char::is_whitespace) {
                Some((role, text)) if !text.trim().is_empty() => match RoleId::parse(role) {
                    Some(role) => Command::SetPrompt(role, text.trim().to_string()),
                    None => Command::Unknown(line.to_string()),
                },
                _ => Command::Unknown(line.to_string()),
            },
            "/history" => Command::History,
            "/clear" => Command::Clear,
            "/providers" => Command::Providers,
            "/provider" if !rest.is_empty() => Command::Provider(rest.to_string()),
            "/status" => Command::Status,
            "/help" => Command::Help,
            _ => Command::Unknown(line.to_string()),
        };
        Some(command)
    }
}

pub const HELP: &str = "\
/voice [file.wav]        record an utterance (Ctrl-C stops); the text pre-fills the next input
/prompts                 show both role prompts
/prompt a|b <text>       replace a role's prompt
/prompts reset [a|b]     restore the built-in prompts
/history                 replay the conversation
/clear                   forget the conversation (prompts are kept)
/providers               list completion providers
/provider <id>           switch provider
/status                  show provider and recording status
quit | exit              leave";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(Command::parse("I are go to school yesterday"), None);
        assert_eq!(Command::parse("  "), None);
    }

    #[test]
    fn test_voice_with_and_without_file() {
        assert_eq!(Command::parse("/voice"), Some(Command::Voice(None)));
        assert_eq!(
            Command::parse("/voice  clips/hello.wav "),
            Some(Command::Voice(Some(PathBuf::from("clips/hello.wav"))))
        );
    }

    #[test]
    fn test_prompt_commands() {
        assert_eq!(Command::parse("/prompts"), Some(Command::Prompts));
        assert_eq!(
            Command::parse("/prompt B You fix my grammar."),
            Some(Command::SetPrompt(RoleId::B, "You fix my grammar.".to_string()))
        );
        assert_eq!(Command::parse("/prompts reset"), Some(Command::ResetPrompts(None)));
        assert_eq!(
            Command::parse("/prompts reset a"),
            Some(Command::ResetPrompts(Some(RoleId::A)))
        );
        assert!(matches!(Command::parse("/prompt c hi"), Some(Command::Unknown(_))));
        assert!(matches!(Command::parse("/prompt a"), Some(Command::Unknown(_))));
    }

    #[test]
    fn test_provider_requires_an_id() {
        assert_eq!(
            Command::parse("/provider deepseek"),
            Some(Command::Provider("deepseek".to_string()))
        );
        assert!(matches!(Command::parse("/provider"), Some(Command::Unknown(_))));
        assert!(matches!(Command::parse("/plan"), Some(Command::Unknown(_))));
    }

    #[test]
    fn test_every_listed_name_parses() {
        for name in COMMAND_NAMES {
            let line = match *name {
                "/prompt" => "/prompt a text".to_string(),
                "/provider" => "/provider tongyi".to_string(),
                other => other.to_string(),
            };
            assert!(
                !matches!(Command::parse(&line), Some(Command::Unknown(_)) | None),
                "{name} did not parse"
            );
        }
    }
}
