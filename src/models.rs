//! Core data types used throughout labcheck.
//!
//! These types describe the chat events that enter the bot and the handles
//! it uses to answer them. They are transport-neutral: the Telegram adapter
//! converts Bot API updates into [`InboundEvent`]s and back.

/// Identifier of a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a message the bot has sent, used to edit it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: ChatId,
    pub message_id: i64,
}

/// A document attached to an inbound message.
#[derive(Debug, Clone)]
pub struct IncomingDocument {
    /// File name as declared by the sender.
    pub file_name: String,
    /// Declared size in bytes. Checked before anything is downloaded.
    pub file_size: u64,
    /// Transport-specific locator used to fetch the bytes.
    pub locator: String,
}

/// An inline button attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    /// Opaque payload delivered back in [`InboundEvent::Callback`].
    pub data: String,
}

/// Rows of inline buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

/// An event the bot reacts to.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A new session (`/start`).
    Start { chat: ChatId, first_name: String },
    /// A plain text message that is not a command.
    Text { chat: ChatId, text: String },
    /// A message carrying a document.
    Document {
        chat: ChatId,
        document: IncomingDocument,
    },
    /// A button press.
    Callback {
        chat: ChatId,
        callback_id: String,
        data: String,
    },
}

impl InboundEvent {
    pub fn chat(&self) -> ChatId {
        match self {
            InboundEvent::Start { chat, .. }
            | InboundEvent::Text { chat, .. }
            | InboundEvent::Document { chat, .. }
            | InboundEvent::Callback { chat, .. } => *chat,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Start { .. } => "start",
            InboundEvent::Text { .. } => "text",
            InboundEvent::Document { .. } => "document",
            InboundEvent::Callback { .. } => "callback",
        }
    }
}
