use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::{Editor, ExternalPrinter};

use duet_application::{ChatService, TranscriptionSession};
use duet_core::config::AppConfig;
use duet_infrastructure::{ConfigService, DuetPaths};

mod ansi_target;
mod commands;
mod helper;
mod logging;
mod repl;

use commands::Command;
use helper::CliHelper;
use repl::Repl;

#[derive(Parser)]
#[command(name = "duet")]
#[command(
    about = "Duet - practise English with a conversation partner and a native rewriter",
    long_about = None
)]
struct Cli {
    /// Configuration file to use instead of the per-user config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the completion gateway
    #[arg(long)]
    gateway: Option<String>,

    /// Completion provider id (e.g. tongyi, deepseek)
    #[arg(long)]
    provider: Option<String>,

    /// Keep configuration, prompts, history and logs under this directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

impl Cli {
    /// Command-line values win over the file and the environment.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(gateway) = &self.gateway {
            config.gateway.base_url = gateway.trim_end_matches('/').to_string();
        }
        if let Some(provider) = &self.provider {
            config.gateway.provider = provider.clone();
        }
    }
}

/// Entry point of the `duet` REPL.
///
/// Lines typed at the prompt go to both roles; lines starting with `/` are
/// commands. `/voice` records an utterance and pre-fills the next prompt
/// with the recognized text so it can be corrected before sending.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ===== Paths, logging and configuration =====
    let paths = match &cli.data_dir {
        Some(dir) => DuetPaths::with_root(dir),
        None => DuetPaths::new()?,
    };
    let (_log_guard, mut notifications) = logging::init(&paths.logs_dir())?;

    let config_service = match &cli.config {
        Some(path) => ConfigService::with_path(path.clone()),
        None => ConfigService::new(&paths),
    };
    let mut config = config_service.get_config()?;
    cli.apply(&mut config);
    tracing::info!(
        "[Main] Gateway {} with provider {}",
        config.gateway.base_url,
        config.gateway.provider
    );

    // ===== Backend Initialization =====
    let chat = ChatService::open(&config, &paths)?;
    let session = TranscriptionSession::from_config(&config);
    let repl = Repl::new(chat, session);

    // ===== REPL Setup =====
    let mut rl = Editor::new()?;
    rl.set_helper(Some(CliHelper::new()));

    // Warnings from the backend show up above the prompt.
    let mut printer = rl.create_external_printer()?;
    let toasts = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            let line = format!("! {}", notification.message);
            let line = if notification.level == "ERROR" {
                line.red().to_string()
            } else {
                line.yellow().to_string()
            };
            if printer.print(line).is_err() {
                break;
            }
        }
    });

    println!("{}", "=== Duet ===".bright_magenta().bold());
    println!(
        "{}",
        "Type a sentence to talk, '/voice' to speak, '/help' for commands, or 'quit' to exit."
            .bright_black()
    );
    println!();
    repl.start().await?;

    // ===== Main REPL Loop =====
    let mut prefill = String::new();
    loop {
        let readline = if prefill.is_empty() {
            rl.readline(">> ")
        } else {
            rl.readline_with_initial(">> ", (prefill.as_str(), ""))
        };
        prefill.clear();

        match readline {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed == "quit" || trimmed == "exit" {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }

                if trimmed.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&line);

                match Command::parse(trimmed) {
                    Some(command) => {
                        if let Some(text) = repl.run(command).await {
                            prefill = text;
                        }
                    }
                    None => repl.submit(trimmed).await,
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    toasts.abort();
    Ok(())
}
