//! Ollama HTTP API contract shared by the local completer and the vision OCR engine.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Model names are used in JSON bodies only, but are still checked before any
/// HTTP call: `[namespace/]model[:tag]`, each segment alphanumeric-led.
static MODEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$")
        .expect("static regex")
});

/// Request body for Ollama `/api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    /// `"json"` constrains the output to a JSON document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'a str>,
    pub options: GenerationOptions,
}

/// Response body from Ollama `/api/generate` (non-streaming).
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

/// Request body for Ollama `/api/chat`. Needed for images on chat-template models.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images (user messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// Response body from Ollama `/api/chat` (non-streaming).
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

/// Sampling parameters. Extraction is deterministic.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            num_predict: None,
        }
    }
}

/// Validate a model name against the Ollama naming convention.
pub fn is_valid_model_name(name: &str) -> bool {
    MODEL_NAME.is_match(name)
}

/// Trim trailing slashes so `{base}/api/...` joins cleanly.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
