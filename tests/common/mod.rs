//! Shared fakes for the integration tests: an in-memory chat transport that
//! records everything the bot sends, and a completion provider with a canned
//! reply.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use labcheck::completion::{CompletionProvider, CompletionRequest, Grader};
use labcheck::extract::Capabilities;
use labcheck::intake::IntakeHandler;
use labcheck::models::{ChatId, Keyboard, MessageRef};
use labcheck::registry::ModelSelection;
use labcheck::transport::ChatTransport;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ─── Transport ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message {
        chat: ChatId,
        text: String,
        keyboard: bool,
    },
    Edit {
        message_id: i64,
        text: String,
    },
    CallbackAnswer(String),
}

/// Serves files from memory and records outbound traffic.
#[derive(Default)]
pub struct RecordingTransport {
    files: Mutex<HashMap<String, Vec<u8>>>,
    sent: Mutex<Vec<Sent>>,
    downloads: Mutex<Vec<PathBuf>>,
    next_id: AtomicI64,
}

impl RecordingTransport {
    pub fn add_file(&self, locator: &str, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(locator.to_string(), bytes.into());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts of sent (not edited) messages, in order.
    pub fn messages(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Texts of status edits, in order.
    pub fn edits(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn downloads(&self) -> Vec<PathBuf> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(Sent::Message {
            chat,
            text: text.to_string(),
            keyboard: keyboard.is_some(),
        });
        Ok(MessageRef { chat, message_id })
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Edit {
            message_id: message.message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn download_file(&self, locator: &str, dest: &Path) -> Result<()> {
        self.downloads.lock().unwrap().push(dest.to_path_buf());
        let bytes = match self.files.lock().unwrap().get(locator) {
            Some(bytes) => bytes.clone(),
            None => bail!("file {} not found", locator),
        };
        std::fs::write(dest, bytes)?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::CallbackAnswer(callback_id.to_string()));
        Ok(())
    }
}

// ─── Completion ─────────────────────────────────────────────────────

/// Answers every request with the same reply and keeps the requests.
pub struct ScriptedProvider {
    reply: Result<String, String>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(reply: Result<String, String>) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.seen.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(body) => Ok(body.clone()),
            Err(e) => bail!("{}", e),
        }
    }
}

// ─── Harness ────────────────────────────────────────────────────────

/// A grader, transport and scratch directories for one test.
pub struct Harness {
    pub tmp: TempDir,
    pub transport: Arc<RecordingTransport>,
    pub provider: Arc<ScriptedProvider>,
    pub selection: Arc<ModelSelection>,
}

impl Harness {
    pub fn new(reply: Result<String, String>) -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("work")).unwrap();
        let selection = Arc::new(ModelSelection::load(tmp.path().join("models.json")));
        Self {
            tmp,
            transport: Arc::new(RecordingTransport::default()),
            provider: Arc::new(ScriptedProvider::new(reply)),
            selection,
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.tmp.path().join("models.json")
    }

    /// Directory that holds per-request temporary files.
    pub fn work_dir(&self) -> PathBuf {
        self.tmp.path().join("work")
    }

    pub fn work_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.work_dir()).unwrap().next().is_none()
    }

    pub fn grader(&self) -> Grader {
        Grader::new(self.provider.clone(), Arc::clone(&self.selection))
    }

    pub fn intake(&self, capabilities: Capabilities) -> IntakeHandler {
        IntakeHandler::new(
            self.transport.clone(),
            self.grader(),
            capabilities,
            Some(self.work_dir()),
            Keyboard::default(),
        )
    }

    pub fn bot(&self) -> labcheck::bot::Bot {
        labcheck::bot::Bot::new(
            self.transport.clone(),
            self.grader(),
            Capabilities::compiled(),
            Some(self.work_dir()),
        )
    }
}

/// A DOCX archive whose body holds `body` (raw WordprocessingML).
pub fn docx_with_body(body: &str) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}
