//! Vision OCR engine: transcribes report-card photos through an Ollama
//! vision model (`/api/chat` with base64 images).

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;

use super::types::TextExtractor;
use super::OcrError;
use crate::models::OcrEngineKind;
use crate::pipeline::structuring::ollama_types::{
    normalize_base_url, ChatMessage, ChatRequest, ChatResponse, GenerationOptions,
};

/// Larger images are rejected before encoding.
const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

const SYSTEM_PROMPT: &str = "\
Você transcreve boletins escolares fotografados. Transcreva TODO o texto visível, \
linha por linha, preservando a ordem das colunas das tabelas de notas.";

const USER_PROMPT: &str = "\
Transcreva o texto deste boletim. Para cada disciplina mantenha na mesma linha o nome, \
as faltas e as notas. Não resuma, não comente, não traduza.";

/// Vision OCR backed by a local Ollama model.
pub struct OllamaVisionOcr {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaVisionOcr {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OcrError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            model: model.to_string(),
            timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, image_b64: String) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                    images: None,
                },
                ChatMessage {
                    role: "user".into(),
                    content: USER_PROMPT.into(),
                    images: Some(vec![image_b64]),
                },
            ],
            stream: false,
            options: GenerationOptions::default(),
        }
    }
}

#[async_trait]
impl TextExtractor for OllamaVisionOcr {
    async fn extract(&self, path: &Path) -> Result<String, OcrError> {
        let start = Instant::now();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| OcrError::Failed(format!("cannot read image: {e}")))?;

        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(OcrError::Failed(format!(
                "image too large ({} bytes)",
                bytes.len()
            )));
        }

        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let body = self.request_body(image_b64);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OcrError::Failed(format!("vision OCR timed out after {}s", self.timeout_secs))
                } else {
                    OcrError::Unavailable(format!("cannot reach {}: {e}", self.base_url))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                404 => OcrError::Unavailable(format!("vision model '{}' not found", self.model)),
                code => OcrError::Failed(format!("vision OCR returned {code}: {body}")),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Failed(format!("malformed vision response: {e}")))?;

        tracing::debug!(
            model = %self.model,
            image_size = bytes.len(),
            text_len = parsed.message.content.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Vision OCR extraction complete"
        );

        Ok(parsed.message.content)
    }

    fn engine(&self) -> OcrEngineKind {
        OcrEngineKind::Vision
    }

    /// A local Ollama runs one vision inference at a time.
    fn supports_concurrent_calls(&self) -> bool {
        false
    }
}
