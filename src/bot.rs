//! Inbound event routing.
//!
//! [`Bot::handle`] maps each [`InboundEvent`] to its reply:
//!
//! | Event | Reply |
//! |-------|-------|
//! | `/start` | welcome, current model, keyboard |
//! | text (not a command) | "send a file" prompt, current model, keyboard |
//! | document | [`IntakeHandler::handle_document`] |
//! | button `setModel:<key>` | confirmation or "unknown model", keyboard |
//! | button `help` | help text, keyboard |
//!
//! Events are independent; the transport layer may run many `handle` calls
//! concurrently.

use std::sync::Arc;

use crate::completion::Grader;
use crate::extract::Capabilities;
use crate::intake::IntakeHandler;
use crate::models::{Button, ChatId, InboundEvent, Keyboard};
use crate::registry::{ModelSelection, AVAILABLE_MODELS};
use crate::transport::{escape_html, ChatTransport};

/// Button payload prefix for model selection.
pub const SET_MODEL_PREFIX: &str = "setModel:";
/// Button payload for the help text.
pub const HELP_DATA: &str = "help";

const HELP_TEXT: &str = "📖 Send a file: PDF, DOCX or TXT (max 20 MB).\n\
Pick a model with the buttons. The selected model is kept across restarts.";

/// The model picker: two models per row, then a help button.
pub fn model_keyboard() -> Keyboard {
    let mut rows: Vec<Vec<Button>> = AVAILABLE_MODELS
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|m| Button {
                    label: m.label.to_string(),
                    data: format!("{}{}", SET_MODEL_PREFIX, m.key),
                })
                .collect()
        })
        .collect();
    rows.push(vec![Button {
        label: "❓ Help".to_string(),
        data: HELP_DATA.to_string(),
    }]);
    Keyboard { rows }
}

pub fn welcome_text(first_name: &str, model: &str) -> String {
    format!(
        "🎓 <b>Hi, {}!</b>\n\n\
         I review lab reports with AI.\n\n\
         🤖 <b>Current model:</b>\n<code>{}</code>\n\n\
         📄 Send a file (PDF, DOCX or TXT) and I will analyse it.",
        escape_html(first_name),
        escape_html(model)
    )
}

pub fn send_file_prompt(model: &str) -> String {
    format!(
        "📄 Send a file to review (PDF/DOCX/TXT).\n\n🤖 <b>Current model:</b> <code>{}</code>",
        escape_html(model)
    )
}

pub fn model_changed_text(model: &str) -> String {
    format!("✅ Model changed to:\n<code>{}</code>", escape_html(model))
}

pub const UNKNOWN_MODEL_TEXT: &str = "❌ Unknown model";

/// Routes inbound events to their handlers.
pub struct Bot {
    transport: Arc<dyn ChatTransport>,
    selection: Arc<ModelSelection>,
    intake: IntakeHandler,
    keyboard: Keyboard,
}

impl Bot {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        grader: Grader,
        capabilities: Capabilities,
        temp_dir: Option<std::path::PathBuf>,
    ) -> Self {
        let keyboard = model_keyboard();
        let selection = Arc::clone(grader.selection());
        let intake = IntakeHandler::new(
            Arc::clone(&transport),
            grader,
            capabilities,
            temp_dir,
            keyboard.clone(),
        );
        Self {
            transport,
            selection,
            intake,
            keyboard,
        }
    }

    /// Handle one event to completion. Never fails; problems are logged.
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Start { chat, first_name } => {
                let text = welcome_text(&first_name, self.selection.current());
                self.reply(chat, &text).await;
            }
            InboundEvent::Text { chat, text } => {
                if text.starts_with('/') {
                    tracing::debug!(command = %text, "ignoring unknown command");
                    return;
                }
                self.reply(chat, &send_file_prompt(self.selection.current()))
                    .await;
            }
            InboundEvent::Document { chat, document } => {
                let outcome = self.intake.handle_document(chat, &document).await;
                tracing::debug!(?outcome, "document request finished");
            }
            InboundEvent::Callback {
                chat,
                callback_id,
                data,
            } => {
                if let Err(e) = self.transport.answer_callback(&callback_id).await {
                    tracing::debug!(error = %format!("{:#}", e), "could not answer callback");
                }
                self.handle_callback(chat, &data).await;
            }
        }
    }

    async fn handle_callback(&self, chat: ChatId, data: &str) {
        if let Some(key) = data.strip_prefix(SET_MODEL_PREFIX) {
            let text = match self.selection.set_model(key) {
                Some(model) => model_changed_text(model),
                None => {
                    tracing::info!(key, "unknown model requested");
                    UNKNOWN_MODEL_TEXT.to_string()
                }
            };
            self.reply(chat, &text).await;
        } else if data == HELP_DATA {
            self.reply(chat, HELP_TEXT).await;
        } else {
            tracing::debug!(data, "ignoring unknown callback");
        }
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self
            .transport
            .send_message(chat, text, Some(&self.keyboard))
            .await
        {
            tracing::warn!(chat = %chat, error = %format!("{:#}", e), "could not send reply");
        }
    }
}
