//! Completion provider abstraction and the grading call.
//!
//! Defines the [`CompletionProvider`] trait and its HTTP implementation:
//! - **[`OpenRouterProvider`]**: calls an OpenAI-compatible
//!   `POST {base_url}/chat/completions` endpoint (OpenRouter by default).
//!
//! [`Grader::check_with_ai`] builds the fixed grading prompt, reads the active
//! model from the [`ModelSelection`] at call time and returns an
//! [`Assessment`]. Provider failures never become `Err`: they are folded into
//! [`Assessment::Failed`] so the user sees the error text in the result.
//!
//! # Sampling
//!
//! Every grading request uses [`GRADING_SAMPLING`]:
//!
//! | Parameter | Value |
//! |-----------|-------|
//! | `max_tokens` | 1100 |
//! | `temperature` | 0.6 |
//! | `top_p` | 0.9 |
//! | `frequency_penalty` | 0.4 |
//! | `presence_penalty` | 0.3 |
//!
//! There is no retry: one failed call produces one user-visible error.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::registry::ModelSelection;

/// Sampling parameters sent with a completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

/// The fixed parameters used for grading.
pub const GRADING_SAMPLING: SamplingParams = SamplingParams {
    max_tokens: 1100,
    temperature: 0.6,
    top_p: 0.9,
    frequency_penalty: 0.4,
    presence_penalty: 0.3,
};

/// A single-turn chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub params: SamplingParams,
}

impl CompletionRequest {
    /// OpenAI chat-completions request body.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": self.prompt }
            ],
            "max_tokens": self.params.max_tokens,
            "temperature": self.params.temperature,
            "top_p": self.params.top_p,
            "frequency_penalty": self.params.frequency_penalty,
            "presence_penalty": self.params.presence_penalty,
        })
    }
}

/// A chat-completion backend.
///
/// Implementations return the text of the first choice. Errors carry a
/// human-readable description; the grader shows it to the user verbatim.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs (e.g. `"openrouter"`).
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

// ============ OpenRouter Provider ============

/// Completion provider for any OpenAI-compatible endpoint.
///
/// Sends the API key as a bearer token. The configured timeout bounds each
/// call; there is no retry.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenRouterProvider {
    pub fn new(config: &CompletionConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request.to_json())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion_response(&json)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
///
/// OpenRouter reports some upstream failures as a 200 with an `error` object,
/// so that is checked first.
pub fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    if let Some(message) = json
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        bail!("provider error: {}", message);
    }

    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices[0].message.content"))
}

// ═══════════════════════════════════════════════════════════════════════
// Grading
// ═══════════════════════════════════════════════════════════════════════

/// Build the grading prompt for `text`. The text is appended verbatim.
pub fn build_grading_prompt(text: &str) -> String {
    format!(
        "You are a computer science instructor. Review the student's lab work briefly and to the point.

Provide:
1) A short summary (1-2 sentences).
2) A score for each of four criteria (10 points each): correctness, completeness, formatting, documentation.
3) 2-3 short recommendations.
4) The final score on the last line in the format: Final score: X/40

Lab work text:
{}
",
        text
    )
}

/// Outcome of one grading call.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// The model answered.
    Completed { model: String, body: String },
    /// The call failed; `error` describes why.
    Failed { model: String, error: String },
}

impl Assessment {
    /// The model this assessment was requested from.
    pub fn model(&self) -> &str {
        match self {
            Assessment::Completed { model, .. } | Assessment::Failed { model, .. } => model,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Assessment::Failed { .. })
    }

    /// Text relayed to the user.
    pub fn text(&self) -> String {
        match self {
            Assessment::Completed { model, body } => format!("🤖 Model: {}\n\n{}", model, body),
            Assessment::Failed { error, .. } => format!("❌ AI request failed: {}", error),
        }
    }
}

/// Sends documents to the completion provider with the selected model.
#[derive(Clone)]
pub struct Grader {
    provider: Arc<dyn CompletionProvider>,
    selection: Arc<ModelSelection>,
}

impl Grader {
    pub fn new(provider: Arc<dyn CompletionProvider>, selection: Arc<ModelSelection>) -> Self {
        Self {
            provider,
            selection,
        }
    }

    pub fn selection(&self) -> &Arc<ModelSelection> {
        &self.selection
    }

    /// Grade `text` with the model selected right now.
    pub async fn check_with_ai(&self, text: &str) -> Assessment {
        let model = self.selection.current().to_string();
        let request = CompletionRequest {
            model: model.clone(),
            prompt: build_grading_prompt(text),
            params: GRADING_SAMPLING,
        };

        tracing::info!(
            provider = self.provider.name(),
            model = %model,
            prompt_chars = request.prompt.chars().count(),
            "requesting assessment"
        );

        match self.provider.complete(&request).await {
            Ok(body) => {
                tracing::info!(model = %model, response_chars = body.chars().count(), "assessment received");
                Assessment::Completed { model, body }
            }
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::warn!(model = %model, error = %error, "completion request failed");
                Assessment::Failed { model, error }
            }
        }
    }
}
