//! TOML configuration and startup secrets.
//!
//! Every section is optional; a missing config file means "all defaults".
//! Secrets never live in the file. They come from the environment (after an
//! optional `.env` is loaded by the binary).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the chat platform bot token.
pub const BOT_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
/// Environment variable holding the completion provider API key.
pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";

/// Telegram's server-side ceiling for long-poll timeouts.
const MAX_POLL_TIMEOUT_SECS: u64 = 50;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_poll_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_completion_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

fn default_state_file() -> PathBuf {
    PathBuf::from("models.json")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IntakeConfig {
    /// Directory for per-request temporary files. System default when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

/// Operator switches for the optional extractors. A format is only
/// available when its cargo feature is compiled in *and* enabled here.
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_true")]
    pub pdf: bool,
    #[serde(default = "default_true")]
    pub docx: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pdf: true,
            docx: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_log_filter() -> String {
    "info,labcheck=debug".to_string()
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

/// Parse and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.telegram.api_base.trim().is_empty() {
        anyhow::bail!("telegram.api_base must not be empty");
    }
    if config.telegram.poll_timeout_secs > MAX_POLL_TIMEOUT_SECS {
        anyhow::bail!(
            "telegram.poll_timeout_secs must be <= {}",
            MAX_POLL_TIMEOUT_SECS
        );
    }

    if config.completion.base_url.trim().is_empty() {
        anyhow::bail!("completion.base_url must not be empty");
    }
    if config.completion.timeout_secs == 0 {
        anyhow::bail!("completion.timeout_secs must be > 0");
    }

    match config.logging.format.as_str() {
        "pretty" | "json" => {}
        other => anyhow::bail!(
            "Unknown logging.format: '{}'. Must be pretty or json.",
            other
        ),
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Secrets
// ═══════════════════════════════════════════════════════════════════════

/// A required secret was absent at startup. Fatal.
#[derive(Debug)]
pub enum StartupError {
    MissingSecret(&'static str),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::MissingSecret(var) => {
                write!(f, "{} is not set (add it to the environment or .env)", var)
            }
        }
    }
}

impl std::error::Error for StartupError {}

/// Credentials read from the environment.
#[derive(Clone)]
pub struct Secrets {
    pub bot_token: String,
    pub api_key: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("bot_token", &"<redacted>")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    /// Both secrets, as required by the bot.
    pub fn from_env() -> Result<Self, StartupError> {
        Ok(Self {
            bot_token: require_env(BOT_TOKEN_VAR)?,
            api_key: require_env(API_KEY_VAR)?,
        })
    }
}

/// Read a non-empty environment variable.
pub fn require_env(var: &'static str) -> Result<String, StartupError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(StartupError::MissingSecret(var)),
    }
}
