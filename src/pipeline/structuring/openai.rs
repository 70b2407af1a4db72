use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ollama_types::normalize_base_url;
use super::types::TextCompleter;
use super::ProviderError;
use crate::models::ProviderKind;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str =
    "Você extrai dados de boletins escolares e responde somente com JSON válido.";

/// OpenAI-compatible hosted chat-completions provider.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: model.to_string(),
            timeout_secs,
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = normalize_base_url(url);
        self
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let start = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };

        tracing::debug!(model = %self.model, "Sending request to OpenAI");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("no message content".into()))?;

        tracing::debug!(
            model = %self.model,
            response_len = content.len(),
            tokens = parsed.usage.and_then(|u| u.total_tokens).unwrap_or(0),
            latency_ms = start.elapsed().as_millis() as u64,
            "OpenAI response received"
        );

        Ok(content)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

/// Messages for a document query: the document travels as its own context
/// message, followed by the extraction instructions.
fn document_messages(document: &str, prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new("system", SYSTEM_PROMPT),
        ChatMessage::new(
            "user",
            format!("Texto extraído do boletim por OCR:\n<boletim>\n{document}\n</boletim>"),
        ),
        ChatMessage::new("user", prompt),
    ]
}

#[async_trait]
impl TextCompleter for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Hosted
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.chat(vec![
            ChatMessage::new("system", SYSTEM_PROMPT),
            ChatMessage::new("user", prompt),
        ])
        .await
    }

    async fn query_document(&self, document: &str, prompt: &str) -> Result<String, ProviderError> {
        self.chat(document_messages(document, prompt)).await
    }
}
