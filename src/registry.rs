//! Model registry and the persisted model selection.
//!
//! The registry is a fixed table of selectable LLMs, each reachable by a short
//! key (used in button payloads) and identified by a provider-qualified model
//! id (sent to the completion endpoint).
//!
//! The active choice lives in a [`ModelSelection`], shared by `Arc` between the
//! button handler (writer) and the grader (reader). Every change is written to
//! a small JSON record so it survives restarts:
//!
//! ```json
//! { "model": "mistralai/devstral-small-2505:free" }
//! ```
//!
//! Loading never fails: a missing, unreadable or unknown record falls back to
//! the default model. Saving is best-effort: a failed write is logged and the
//! in-memory selection stays authoritative.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// One selectable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelEntry {
    /// Short key used in button payloads (`setModel:<key>`).
    pub key: &'static str,
    /// Button label.
    pub label: &'static str,
    /// Provider-qualified id sent to the completion endpoint.
    pub id: &'static str,
}

/// All selectable models, in keyboard order.
pub const AVAILABLE_MODELS: &[ModelEntry] = &[
    ModelEntry {
        key: "devstral",
        label: "DevStral",
        id: "mistralai/devstral-small-2505:free",
    },
    ModelEntry {
        key: "mistral",
        label: "Mistral",
        id: "mistralai/mistral-7b-instruct:free",
    },
    ModelEntry {
        key: "gemma",
        label: "Gemma",
        id: "google/gemma-7b-it:free",
    },
    ModelEntry {
        key: "nous",
        label: "Nous Hermes",
        id: "nousresearch/nous-hermes-2-mistral:free",
    },
];

/// Key of the model used when nothing valid is persisted.
pub const DEFAULT_MODEL_KEY: &str = "devstral";

/// Look up a model by its short key.
pub fn resolve(key: &str) -> Option<&'static ModelEntry> {
    AVAILABLE_MODELS.iter().find(|m| m.key == key)
}

/// Look up a model by its provider id.
pub fn find_by_id(id: &str) -> Option<&'static ModelEntry> {
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}

/// The default model's id.
pub fn default_model_id() -> &'static str {
    resolve(DEFAULT_MODEL_KEY)
        .map(|m| m.id)
        .unwrap_or(AVAILABLE_MODELS[0].id)
}

// ═══════════════════════════════════════════════════════════════════════
// Persistence
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
struct ModelState {
    model: String,
}

/// Read the persisted model id, falling back to the default.
///
/// Returns the default when the file does not exist, cannot be read or
/// parsed, lacks the `model` field, or names an id outside the registry.
pub fn load_selected_model(path: &Path) -> &'static str {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return default_model_id();
    };
    match serde_json::from_str::<ModelState>(&raw) {
        Ok(state) => match find_by_id(&state.model) {
            Some(entry) => entry.id,
            None => {
                tracing::warn!(
                    path = %path.display(),
                    model = %state.model,
                    "persisted model is not in the registry, using default"
                );
                default_model_id()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable model state, using default");
            default_model_id()
        }
    }
}

/// Overwrite the persisted record with `model_id`.
pub fn save_selected_model(path: &Path, model_id: &str) -> Result<()> {
    let json = serde_json::to_string(&ModelState {
        model: model_id.to_string(),
    })?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write model state: {}", path.display()))
}

// ═══════════════════════════════════════════════════════════════════════
// Selection coordinator
// ═══════════════════════════════════════════════════════════════════════

/// The currently active model, persisted on every change.
///
/// Reads are snapshots: a caller that has read [`current`](Self::current)
/// keeps using that id even if the selection changes afterwards.
#[derive(Debug)]
pub struct ModelSelection {
    state_file: PathBuf,
    current: RwLock<&'static ModelEntry>,
}

impl ModelSelection {
    /// Initialise from the persisted record at `state_file`.
    pub fn load(state_file: impl Into<PathBuf>) -> Self {
        let state_file = state_file.into();
        let id = load_selected_model(&state_file);
        let entry = find_by_id(id).unwrap_or(&AVAILABLE_MODELS[0]);
        tracing::debug!(model = entry.id, path = %state_file.display(), "loaded model selection");
        Self {
            state_file,
            current: RwLock::new(entry),
        }
    }

    /// Snapshot of the active model id.
    pub fn current(&self) -> &'static str {
        self.current_entry().id
    }

    /// Snapshot of the active registry entry.
    pub fn current_entry(&self) -> &'static ModelEntry {
        // A poisoned lock still holds a valid &'static entry.
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Switch to the model registered under `key` and persist the choice.
    ///
    /// Returns the new model id, or `None` for an unknown key, in which case
    /// nothing changes.
    pub fn set_model(&self, key: &str) -> Option<&'static str> {
        let entry = resolve(key)?;
        // The guard is held across the write so the record always matches memory.
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = entry;
        if let Err(e) = save_selected_model(&self.state_file, entry.id) {
            tracing::warn!(error = %format!("{:#}", e), "could not persist model selection");
        }
        drop(guard);
        tracing::info!(model = entry.id, "model selection changed");
        Some(entry.id)
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }
}
