//! Document intake: from an inbound file to a relayed assessment.
//!
//! One request runs these steps in order:
//!
//! 1. reject files whose declared size exceeds [`MAX_FILE_BYTES`] (nothing is
//!    downloaded);
//! 2. reject names without a `.pdf`, `.docx` or `.txt` suffix (any case);
//! 3. post a status message, download into a fresh temporary file;
//! 4. extract the text and require it to be non-blank;
//! 5. grade it, update the status, relay the result in chunks of at most
//!    [`CHUNK_CHARS`] characters.
//!
//! The temporary file is removed on every path out of steps 3–5. Any error in
//! those steps replaces the status message with the error description; the
//! handler itself never returns an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

use crate::completion::Grader;
use crate::extract::{self, Capabilities, DocumentFormat, ExtractError};
use crate::models::{ChatId, IncomingDocument, Keyboard, MessageRef};
use crate::progress::IntakeStatus;
use crate::transport::{escape_html, ChatTransport};

/// Largest accepted declared file size (20 MiB).
pub const MAX_FILE_BYTES: u64 = 20 * 1024 * 1024;

/// Largest relayed chunk, in characters.
pub const CHUNK_CHARS: usize = 4000;

const TOO_LARGE_REPLY: &str = "❌ File is too large (max 20 MB).";
const UNSUPPORTED_REPLY: &str = "❌ Unsupported file format. Send a PDF, DOCX or TXT file.";

/// Why a document request did not produce an assessment.
#[derive(Debug)]
pub enum IntakeError {
    SizeExceeded { size: u64, limit: u64 },
    UnsupportedFormat(String),
    Extraction(ExtractError),
    /// Extraction succeeded but the text is blank.
    EmptyContent,
    TempFile(std::io::Error),
    /// Download or messaging failed.
    Transport(anyhow::Error),
}

impl std::fmt::Display for IntakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntakeError::SizeExceeded { size, limit } => {
                write!(f, "file is too large ({} bytes, limit {})", size, limit)
            }
            IntakeError::UnsupportedFormat(name) => write!(f, "unsupported file format: {}", name),
            IntakeError::Extraction(e) => write!(f, "{}", e),
            IntakeError::EmptyContent => {
                write!(f, "the file is empty or contains no readable text")
            }
            IntakeError::TempFile(e) => write!(f, "could not create a temporary file: {}", e),
            IntakeError::Transport(e) => write!(f, "{:#}", e),
        }
    }
}

impl std::error::Error for IntakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IntakeError::Extraction(e) => Some(e),
            IntakeError::TempFile(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ExtractError> for IntakeError {
    fn from(e: ExtractError) -> Self {
        IntakeError::Extraction(e)
    }
}

/// What happened to one request.
#[derive(Debug)]
pub enum IntakeOutcome {
    /// Refused before any download.
    Rejected(IntakeError),
    /// Failed after the status message was posted.
    Failed(IntakeError),
    /// The assessment (possibly an in-band completion error) was relayed.
    Assessed {
        model: String,
        chars: usize,
        chunks: usize,
        completion_failed: bool,
    },
}

/// Check the declared size, then the file name suffix.
pub fn validate(document: &IncomingDocument) -> Result<DocumentFormat, IntakeError> {
    if document.file_size > MAX_FILE_BYTES {
        return Err(IntakeError::SizeExceeded {
            size: document.file_size,
            limit: MAX_FILE_BYTES,
        });
    }
    DocumentFormat::from_file_name(&document.file_name)
        .ok_or_else(|| IntakeError::UnsupportedFormat(document.file_name.clone()))
}

/// Split `text` into pieces of at most `max_chars` characters.
///
/// Splits fall on exact character counts with no regard for words or lines.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let split_at = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(split_at);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

/// Render the result messages: one per chunk, the second and later labelled
/// as continuations numbered from 2.
pub fn render_chunks(text: &str) -> Vec<String> {
    let parts = split_chunks(text, CHUNK_CHARS);
    if parts.len() <= 1 {
        return vec![format!("📋 <b>Review result:</b>\n\n{}", escape_html(text))];
    }
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if i == 0 {
                format!("📋 <b>Review result:</b>\n\n{}", escape_html(part))
            } else {
                format!(
                    "📋 <b>Review result (continuation {}):</b>\n\n{}",
                    i + 1,
                    escape_html(part)
                )
            }
        })
        .collect()
}

/// Remove a request's temporary file, logging rather than failing.
pub fn discard_temp_file(path: TempPath) {
    let shown = path.display().to_string();
    match path.close() {
        Ok(()) => tracing::debug!(path = %shown, "removed temporary file"),
        Err(e) => tracing::warn!(path = %shown, error = %e, "could not remove temporary file"),
    }
}

/// Runs document requests against a transport and a grader.
pub struct IntakeHandler {
    transport: Arc<dyn ChatTransport>,
    grader: Grader,
    capabilities: Capabilities,
    temp_dir: Option<PathBuf>,
    keyboard: Keyboard,
}

impl IntakeHandler {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        grader: Grader,
        capabilities: Capabilities,
        temp_dir: Option<PathBuf>,
        keyboard: Keyboard,
    ) -> Self {
        Self {
            transport,
            grader,
            capabilities,
            temp_dir,
            keyboard,
        }
    }

    /// Handle one inbound document. Errors are reported to the chat, not returned.
    #[tracing::instrument(
        skip(self, document),
        fields(chat = %chat, file_name = %document.file_name, size = document.file_size)
    )]
    pub async fn handle_document(&self, chat: ChatId, document: &IncomingDocument) -> IntakeOutcome {
        let format = match validate(document) {
            Ok(format) => format,
            Err(e) => {
                tracing::info!(reason = %e, "document rejected");
                let reply = match e {
                    IntakeError::SizeExceeded { .. } => TOO_LARGE_REPLY,
                    _ => UNSUPPORTED_REPLY,
                };
                self.reply(chat, reply).await;
                return IntakeOutcome::Rejected(e);
            }
        };

        let processing = IntakeStatus::Processing {
            model: self.grader.selection().current(),
        };
        let status = match self
            .transport
            .send_message(chat, &processing.render(), None)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "could not post status message");
                return IntakeOutcome::Failed(IntakeError::Transport(e));
            }
        };

        match self.assess(&status, document, format).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "document request failed");
                let error = e.to_string();
                let text = IntakeStatus::Failed { error: &error }.render();
                if let Err(edit_err) = self
                    .transport
                    .edit_message(&status, &text, Some(&self.keyboard))
                    .await
                {
                    tracing::warn!(error = %format!("{:#}", edit_err), "could not report failure");
                }
                IntakeOutcome::Failed(e)
            }
        }
    }

    async fn assess(
        &self,
        status: &MessageRef,
        document: &IncomingDocument,
        format: DocumentFormat,
    ) -> Result<IntakeOutcome, IntakeError> {
        if !self.capabilities.supports(format) {
            return Err(ExtractError::DependencyMissing(format).into());
        }

        let temp = self.create_temp_file(format)?;
        let extracted = self.fetch_and_extract(document, format, &temp).await;
        discard_temp_file(temp);
        let text = extracted?;

        if text.trim().is_empty() {
            return Err(IntakeError::EmptyContent);
        }
        let chars = text.chars().count();
        tracing::info!(chars, %format, "text extracted");

        let extracted_status = IntakeStatus::Extracted {
            model: self.grader.selection().current(),
            chars,
        };
        self.transport
            .edit_message(status, &extracted_status.render(), None)
            .await
            .map_err(IntakeError::Transport)?;

        let assessment = self.grader.check_with_ai(&text).await;
        let final_status = if assessment.is_failure() {
            IntakeStatus::CompletedWithoutAssessment {
                model: assessment.model(),
                file_name: &document.file_name,
                chars,
            }
        } else {
            IntakeStatus::Completed {
                model: assessment.model(),
                file_name: &document.file_name,
                chars,
            }
        };
        self.transport
            .edit_message(status, &final_status.render(), None)
            .await
            .map_err(IntakeError::Transport)?;

        let messages = render_chunks(&assessment.text());
        for message in &messages {
            self.transport
                .send_message(status.chat, message, None)
                .await
                .map_err(IntakeError::Transport)?;
        }

        Ok(IntakeOutcome::Assessed {
            model: assessment.model().to_string(),
            chars,
            chunks: messages.len(),
            completion_failed: assessment.is_failure(),
        })
    }

    fn create_temp_file(&self, format: DocumentFormat) -> Result<TempPath, IntakeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("labcheck-").suffix(format.extension());
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(IntakeError::TempFile)?;
        Ok(file.into_temp_path())
    }

    async fn fetch_and_extract(
        &self,
        document: &IncomingDocument,
        format: DocumentFormat,
        path: &Path,
    ) -> Result<String, IntakeError> {
        self.transport
            .download_file(&document.locator, path)
            .await
            .map_err(IntakeError::Transport)?;
        Ok(extract::extract_file(path, format, self.capabilities).await?)
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self
            .transport
            .send_message(chat, text, Some(&self.keyboard))
            .await
        {
            tracing::warn!(error = %format!("{:#}", e), "could not send reply");
        }
    }
}
