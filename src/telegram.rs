//! Telegram Bot API adapter.
//!
//! [`TelegramClient`] implements [`ChatTransport`] over the HTTPS Bot API
//! (`sendMessage`, `editMessageText`, `getFile`, `answerCallbackQuery`) and
//! fetches updates with `getUpdates` long polling. [`run_polling`] is the
//! bot's main loop: it reads updates in order and spawns one task per event,
//! so a slow grading request never blocks other chats.
//!
//! Request URLs contain the bot token, so errors are stripped of their URL
//! before they are logged or shown.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::bot::Bot;
use crate::config::TelegramConfig;
use crate::models::{ChatId, IncomingDocument, InboundEvent, Keyboard, MessageRef};
use crate::transport::ChatTransport;

/// Pause after a failed `getUpdates` before polling again.
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Slack on top of the long-poll timeout for the HTTP client.
const HTTP_TIMEOUT_SLACK_SECS: u64 = 60;

// ═══════════════════════════════════════════════════════════════════════
// Bot API types
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

/// Convert a Bot API update into a bot event. Unhandled kinds yield `None`.
pub fn parse_update(update: &Update) -> Option<InboundEvent> {
    if let Some(query) = &update.callback_query {
        let chat = query
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(query.from.id);
        return Some(InboundEvent::Callback {
            chat: ChatId(chat),
            callback_id: query.id.clone(),
            data: query.data.clone().unwrap_or_default(),
        });
    }

    let message = update.message.as_ref()?;
    let chat = ChatId(message.chat.id);

    if let Some(document) = &message.document {
        return Some(InboundEvent::Document {
            chat,
            document: IncomingDocument {
                file_name: document.file_name.clone().unwrap_or_default(),
                file_size: document.file_size.unwrap_or(0),
                locator: document.file_id.clone(),
            },
        });
    }

    let text = message.text.as_ref()?;
    if is_start_command(text) {
        let first_name = message
            .from
            .as_ref()
            .map(|u| u.first_name.clone())
            .unwrap_or_default();
        return Some(InboundEvent::Start { chat, first_name });
    }
    Some(InboundEvent::Text {
        chat,
        text: text.clone(),
    })
}

/// `/start`, optionally addressed (`/start@my_bot`) or with a payload.
fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|cmd| cmd.split('@').next())
        .map(|cmd| cmd == "/start")
        .unwrap_or(false)
}

/// Inline keyboard as a Bot API `reply_markup`.
pub fn reply_markup(keyboard: &Keyboard) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| serde_json::json!({ "text": b.label, "callback_data": b.data }))
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

// ═══════════════════════════════════════════════════════════════════════
// Client
// ═══════════════════════════════════════════════════════════════════════

/// HTTPS client for one bot.
pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                config.poll_timeout_secs + HTTP_TIMEOUT_SLACK_SECS,
            ))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Telegram {} request failed", method))?;

        let status = response.status();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Telegram {} returned an unreadable response", method))?;

        if !parsed.ok {
            bail!(
                "Telegram {} failed ({}): {}",
                method,
                status,
                parsed.description.unwrap_or_default()
            );
        }
        parsed
            .result
            .ok_or_else(|| anyhow!("Telegram {} returned no result", method))
    }

    /// Identity of the bot; fails when the token is rejected.
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Long-poll for updates with id >= `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &serde_json::json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef> {
        let mut body = serde_json::json!({
            "chat_id": chat.0,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = reply_markup(kb);
        }
        let message: Message = self.call("sendMessage", &body).await?;
        Ok(MessageRef {
            chat: ChatId(message.chat.id),
            message_id: message.message_id,
        })
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": message.chat.0,
            "message_id": message.message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = reply_markup(kb);
        }
        let _: serde_json::Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    async fn download_file(&self, locator: &str, dest: &Path) -> Result<()> {
        let file: File = self
            .call("getFile", &serde_json::json!({ "file_id": locator }))
            .await?;
        let file_path = file
            .file_path
            .ok_or_else(|| anyhow!("Telegram did not provide a download path"))?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("File download failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("File download failed: HTTP {}", status);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| e.without_url())
            .context("File download interrupted")?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        tracing::debug!(bytes = bytes.len(), "file downloaded");
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &serde_json::json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Polling loop
// ═══════════════════════════════════════════════════════════════════════

/// Poll for updates until Ctrl-C, handing each event to `bot` on its own task.
pub async fn run_polling(
    client: Arc<TelegramClient>,
    bot: Arc<Bot>,
    poll_timeout_secs: u64,
) -> Result<()> {
    let me = client
        .get_me()
        .await
        .context("Could not reach Telegram with the configured bot token")?;
    tracing::info!(
        username = me.username.as_deref().unwrap_or("?"),
        "bot started, polling for updates"
    );

    let mut offset = 0i64;
    loop {
        let updates = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, stopping");
                return Ok(());
            }
            result = client.get_updates(offset, poll_timeout_secs) => result,
        };

        match updates {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    match parse_update(&update) {
                        Some(event) => spawn_event(&bot, update.update_id, event),
                        None => tracing::debug!(update_id = update.update_id, "skipping update"),
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "getUpdates failed");
                tokio::time::sleep(POLL_ERROR_DELAY).await;
            }
        }
    }
}

fn spawn_event(bot: &Arc<Bot>, update_id: i64, event: InboundEvent) {
    let bot = Arc::clone(bot);
    let span = tracing::info_span!(
        "update",
        request_id = %Uuid::new_v4(),
        update_id,
        chat = %event.chat(),
        kind = event.kind(),
    );
    tokio::spawn(async move { bot.handle(event).await }.instrument(span));
}
