//! The chat transport seam.
//!
//! The bot talks to its users only through [`ChatTransport`]. The Telegram
//! adapter ([`crate::telegram::TelegramClient`]) is the production
//! implementation; [`ConsoleTransport`] backs the `labcheck check` command by
//! printing messages and reading "downloads" from the local filesystem.
//!
//! ```text
//!   InboundEvent ──▶ Bot::handle ──▶ ChatTransport
//!                                     ├─ send_message / edit_message
//!                                     ├─ download_file
//!                                     └─ answer_callback
//! ```
//!
//! Message text is HTML (`<b>`, `<code>`); callers escape dynamic content
//! with [`escape_html`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::models::{ChatId, Keyboard, MessageRef};

/// Outbound side of a chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send an HTML message, optionally with an inline keyboard.
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef>;

    /// Replace the text (and keyboard) of a message sent earlier.
    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()>;

    /// Fetch the file behind `locator` and write it to `dest`.
    async fn download_file(&self, locator: &str, dest: &Path) -> Result<()>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn answer_callback(&self, _callback_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Escape `&`, `<`, `>` and `"` for HTML message bodies.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Strip the handful of tags the bot emits and undo [`escape_html`].
pub fn html_to_plain(text: &str) -> String {
    let mut out = text.to_string();
    for tag in ["<b>", "</b>", "<code>", "</code>"] {
        out = out.replace(tag, "");
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

// ═══════════════════════════════════════════════════════════════════════
// Console transport
// ═══════════════════════════════════════════════════════════════════════

/// Transport for running the pipeline from the command line.
///
/// Sent messages go to stdout, status edits to stderr, and locators are
/// local file paths that are copied into place.
#[derive(Default)]
pub struct ConsoleTransport {
    next_id: AtomicI64,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}\n", html_to_plain(text))?;
        Ok(MessageRef { chat, message_id })
    }

    async fn edit_message(
        &self,
        _message: &MessageRef,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        eprintln!("{}", html_to_plain(text));
        Ok(())
    }

    async fn download_file(&self, locator: &str, dest: &Path) -> Result<()> {
        tokio::fs::copy(locator, dest)
            .await
            .with_context(|| format!("Failed to read {}", locator))?;
        Ok(())
    }
}
