//! Command handling for the interactive loop.

use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use colored::Colorize;
use duet_application::{ChatService, MarkdownRenderer, TranscriptionSession, VoiceInput};
use duet_core::DuetError;
use duet_core::exchange::ConversationExchange;
use duet_core::prompt::RoleId;
use duet_core::speech::{RecognitionState, SessionEvent};
use duet_interaction::{AudioSource, WavFileSource};
use tokio::sync::broadcast::error::RecvError;

use crate::ansi_target::AnsiTarget;
use crate::commands::{Command, HELP};

/// Everything the REPL talks to.
pub struct Repl {
    chat: ChatService,
    session: TranscriptionSession,
    voice: VoiceInput,
    out: Arc<Mutex<Stdout>>,
}

impl Repl {
    pub fn new(chat: ChatService, session: TranscriptionSession) -> Self {
        Self {
            chat,
            session,
            voice: VoiceInput::new(),
            out: Arc::new(Mutex::new(io::stdout())),
        }
    }

    /// Checks the gateway and replays the stored conversation.
    pub async fn start(&self) -> Result<(), DuetError> {
        match self.chat.health().await {
            Ok(health) if health.is_healthy() => {
                println!(
                    "{}",
                    format!("Gateway ready ({} provider(s))", health.providers.len()).bright_black()
                );
            }
            Ok(health) => {
                let reason = health.message.unwrap_or(health.status);
                println!("{}", format!("Gateway reports a problem: {reason}").yellow());
            }
            Err(e) => println!("{}", format!("Gateway unreachable: {e}").yellow()),
        }

        let exchanges = self.chat.load().await?;
        if !exchanges.is_empty() {
            println!(
                "{}",
                format!("Replaying {} exchange(s)", exchanges.len()).bright_black()
            );
            self.replay(&exchanges);
        }
        Ok(())
    }

    /// Sends one utterance to both roles and prints the replies as they arrive.
    pub async fn submit(&self, input: &str) {
        println!("{}", format!("> {}", input).green());
        let mut target_a = AnsiTarget::new(RoleId::A, self.out.clone());
        let mut target_b = AnsiTarget::new(RoleId::B, self.out.clone());

        match self.chat.submit(input, &mut target_a, &mut target_b).await {
            Ok(outcome) if !outcome.appended && outcome.exchange.has_reply() => {
                println!("{}", "This exchange could not be saved.".yellow());
            }
            Ok(_) => {}
            Err(DuetError::Busy(message)) => println!("{}", message.yellow()),
            Err(e) => eprintln!("{}", format!("Error: {e}").red()),
        }
        println!();
    }

    /// Runs a slash command. Returns text to pre-fill the next input with.
    pub async fn run(&self, command: Command) -> Option<String> {
        let result = match command {
            Command::Voice(path) => return self.record(path).await,
            Command::Prompts => self.show_prompts().await,
            Command::SetPrompt(role, text) => self.chat.set_prompt(role, &text).await.map(|()| {
                println!("{}", format!("Prompt for role {role} updated.").bright_green());
            }),
            Command::ResetPrompts(role) => self.reset_prompts(role).await,
            Command::History => {
                let history = self.chat.history().await;
                if history.is_empty() {
                    println!("{}", "No conversation yet.".bright_black());
                }
                self.replay(&history);
                Ok(())
            }
            Command::Clear => self.chat.clear_history().await.map(|()| {
                println!("{}", "Conversation cleared.".bright_green());
            }),
            Command::Providers => self.show_providers().await,
            Command::Provider(id) => self.chat.select_provider(&id).await.map(|()| {
                println!("{}", format!("Using provider {id}.").bright_green());
            }),
            Command::Status => {
                self.show_status().await;
                Ok(())
            }
            Command::Help => {
                println!("{}", HELP.bright_black());
                Ok(())
            }
            Command::Unknown(line) => {
                println!("{}", format!("Unknown command: {line} (try /help)").bright_black());
                Ok(())
            }
        };
        if let Err(e) = result {
            eprintln!("{}", format!("Error: {e}").red());
        }
        None
    }

    fn replay(&self, exchanges: &[ConversationExchange]) {
        for exchange in exchanges {
            println!("{}", format!("> {}", exchange.user_input).green());
            for role in RoleId::ALL {
                let mut target = AnsiTarget::new(role, self.out.clone()).quiet();
                let mut renderer = MarkdownRenderer::new(&mut target);
                let reply = exchange.reply(role);
                if reply.trim().is_empty() {
                    renderer.fail(&role.failure_marker());
                } else {
                    renderer.write(reply);
                    renderer.end();
                }
            }
            println!();
        }
    }

    async fn show_prompts(&self) -> Result<(), DuetError> {
        let prompts = self.chat.prompts().await?;
        for role in RoleId::ALL {
            println!("{}", format!("[{}] {}", role, role.label()).bright_magenta());
            for line in prompts.get(role).system_text.lines() {
                println!("{}", line.bright_blue());
            }
            println!();
        }
        Ok(())
    }

    async fn reset_prompts(&self, role: Option<RoleId>) -> Result<(), DuetError> {
        let roles = match role {
            Some(role) => vec![role],
            None => RoleId::ALL.to_vec(),
        };
        for role in roles {
            self.chat.reset_prompt(role).await?;
            println!("{}", format!("Prompt for role {role} restored.").bright_green());
        }
        Ok(())
    }

    async fn show_providers(&self) -> Result<(), DuetError> {
        let providers = self.chat.providers().await?;
        let selected = self.chat.provider();
        for (id, info) in &providers {
            let marker = if *id == selected { "*" } else { " " };
            let model = info.model.as_deref().map(|m| format!(" [{m}]")).unwrap_or_default();
            let line = format!("{marker} {id:<10} {}{model}", info.name);
            if info.available {
                println!("{}", line.bright_blue());
            } else {
                println!("{}", format!("{line} (unavailable)").bright_black());
            }
        }
        Ok(())
    }

    async fn show_status(&self) {
        let status = self.session.status();
        println!("provider:   {}", self.chat.provider());
        println!("exchanges:  {}", self.chat.history().await.len());
        println!("recording:  {} ({})", status.is_recording, status.state);
        println!("connected:  {}", status.is_connected);
        if let Some(voice_id) = status.voice_id {
            println!("voice id:   {voice_id}");
        }
    }

    /// Records one utterance and returns its text.
    async fn record(&self, path: Option<PathBuf>) -> Option<String> {
        let source: Box<dyn AudioSource> = match path {
            Some(path) => Box::new(WavFileSource::new(path)),
            None => match microphone() {
                Some(source) => source,
                None => {
                    println!(
                        "{}",
                        "Built without microphone support; use /voice <file.wav>.".yellow()
                    );
                    return None;
                }
            },
        };

        let mut events = self.session.subscribe();
        // Other start failures arrive as a notification from the session.
        if let Err(e) = self.session.start(source.as_ref()).await {
            if let DuetError::Busy(message) = e {
                println!("{}", message.yellow());
            }
            return None;
        }
        println!(
            "{}",
            format!("Recording from {} (Ctrl-C stops)", source.describe()).bright_black()
        );

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut stop_requested = false;
        loop {
            tokio::select! {
                _ = &mut ctrl_c, if !stop_requested => {
                    stop_requested = true;
                    if let Err(e) = self.session.stop().await {
                        eprintln!("{}", format!("\nError: {e}").red());
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        self.voice.apply(&event);
                        match event {
                            SessionEvent::Transcript(_) => self.show_live_text(),
                            SessionEvent::Error { .. } => break,
                            SessionEvent::StateChanged { state: RecognitionState::Idle } => break,
                            _ => {}
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            }
        }
        println!();

        let text = self.voice.take();
        if text.trim().is_empty() {
            println!("{}", "Nothing was recognized.".bright_black());
            None
        } else {
            Some(text)
        }
    }

    fn show_live_text(&self) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = write!(out, "\r\x1b[2K{} {}", "🎤".bright_red(), self.voice.text());
        let _ = out.flush();
    }
}

#[cfg(feature = "microphone")]
fn microphone() -> Option<Box<dyn AudioSource>> {
    Some(Box::new(duet_interaction::MicrophoneSource::new()))
}

#[cfg(not(feature = "microphone"))]
fn microphone() -> Option<Box<dyn AudioSource>> {
    None
}
