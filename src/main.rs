//! # labcheck CLI
//!
//! Runs the lab-report review bot and a few maintenance commands.
//!
//! ## Usage
//!
//! ```bash
//! labcheck --config ./config/labcheck.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `labcheck run` | Start the Telegram bot (long polling) |
//! | `labcheck check <FILE>` | Review a local file and print the result |
//! | `labcheck models` | List available models and mark the selected one |
//! | `labcheck select <KEY>` | Change the persisted model selection |
//!
//! Secrets come from the environment (or a `.env` file):
//! `TELEGRAM_BOT_TOKEN` for `run`, `OPENROUTER_API_KEY` for `run` and `check`.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use labcheck::bot::Bot;
use labcheck::completion::{Grader, OpenRouterProvider};
use labcheck::config::{self, Config, Secrets};
use labcheck::extract::Capabilities;
use labcheck::intake::{IntakeHandler, IntakeOutcome};
use labcheck::models::{ChatId, IncomingDocument, Keyboard};
use labcheck::registry::{ModelSelection, AVAILABLE_MODELS};
use labcheck::telegram::{self, TelegramClient};
use labcheck::transport::{ChatTransport, ConsoleTransport};

/// labcheck: review lab reports with an LLM over Telegram.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(name = "labcheck", version, about = "Review lab reports with an LLM over Telegram")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/labcheck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot and poll Telegram for updates until interrupted.
    Run,

    /// Review a local PDF, DOCX or TXT file with the selected model.
    ///
    /// Status updates go to stderr, the assessment to stdout.
    Check {
        /// File to review.
        file: PathBuf,
    },

    /// List available models.
    Models,

    /// Select the model used for reviews.
    Select {
        /// Model key, e.g. `gemma`.
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?;
    labcheck::logging::init_tracing(&cfg.logging)?;

    match cli.command {
        Commands::Run => run_bot(&cfg).await?,
        Commands::Check { file } => run_check(&cfg, &file).await?,
        Commands::Models => list_models(&cfg),
        Commands::Select { key } => select_model(&cfg, &key)?,
    }

    Ok(())
}

async fn run_bot(cfg: &Config) -> anyhow::Result<()> {
    let secrets = Secrets::from_env()?;
    let capabilities = Capabilities::detect(&cfg.extraction);
    tracing::info!(
        pdf = capabilities.pdf,
        docx = capabilities.docx,
        "extraction capabilities"
    );

    let selection = Arc::new(ModelSelection::load(cfg.models.state_file.clone()));
    tracing::info!(model = selection.current(), "active model");

    let provider = Arc::new(OpenRouterProvider::new(&cfg.completion, secrets.api_key)?);
    let client = Arc::new(TelegramClient::new(&cfg.telegram, secrets.bot_token)?);

    let transport: Arc<dyn ChatTransport> = client.clone();
    let bot = Arc::new(Bot::new(
        transport,
        Grader::new(provider, selection),
        capabilities,
        cfg.intake.temp_dir.clone(),
    ));

    telegram::run_polling(client, bot, cfg.telegram.poll_timeout_secs).await
}

async fn run_check(cfg: &Config, file: &Path) -> anyhow::Result<()> {
    let api_key = config::require_env(config::API_KEY_VAR)?;
    let metadata = std::fs::metadata(file)
        .with_context(|| format!("Cannot read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let selection = Arc::new(ModelSelection::load(cfg.models.state_file.clone()));
    let provider = Arc::new(OpenRouterProvider::new(&cfg.completion, api_key)?);
    let handler = IntakeHandler::new(
        Arc::new(ConsoleTransport::new()),
        Grader::new(provider, selection),
        Capabilities::detect(&cfg.extraction),
        cfg.intake.temp_dir.clone(),
        Keyboard::default(),
    );

    let document = IncomingDocument {
        file_name,
        file_size: metadata.len(),
        locator: file.to_string_lossy().into_owned(),
    };

    match handler.handle_document(ChatId(0), &document).await {
        IntakeOutcome::Assessed {
            completion_failed: false,
            ..
        } => Ok(()),
        IntakeOutcome::Assessed { model, .. } => bail!("{} did not return an assessment", model),
        IntakeOutcome::Rejected(e) | IntakeOutcome::Failed(e) => Err(e.into()),
    }
}

fn list_models(cfg: &Config) {
    let selection = ModelSelection::load(cfg.models.state_file.clone());
    let current = selection.current_entry();

    println!("{:<10} {:<12} MODEL", "KEY", "NAME");
    for entry in AVAILABLE_MODELS {
        let marker = if entry.id == current.id { " *" } else { "" };
        println!("{:<10} {:<12} {}{}", entry.key, entry.label, entry.id, marker);
    }
    println!();
    println!("State file: {}", selection.state_file().display());
}

fn select_model(cfg: &Config, key: &str) -> anyhow::Result<()> {
    let selection = ModelSelection::load(cfg.models.state_file.clone());
    match selection.set_model(key) {
        Some(model) => {
            println!("Selected {}", model);
            Ok(())
        }
        None => {
            let keys: Vec<&str> = AVAILABLE_MODELS.iter().map(|m| m.key).collect();
            bail!("Unknown model '{}'. Available: {}", key, keys.join(", "))
        }
    }
}
