use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::ollama_types::{
    normalize_base_url, GenerateRequest, GenerateResponse, GenerationOptions,
};
use super::types::TextCompleter;
use super::ProviderError;
use crate::models::ProviderKind;

/// Ollama HTTP client for local inference.
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a client for a local Ollama instance.
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: normalize_base_url(base_url),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: Some("json"),
            options: GenerationOptions::default(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        Ok(parsed.response)
    }
}

#[async_trait]
impl TextCompleter for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.generate(prompt).await
    }

    /// Local models get one self-contained prompt: document after instructions.
    async fn query_document(&self, document: &str, prompt: &str) -> Result<String, ProviderError> {
        let combined = format!("{prompt}\n\n<boletim>\n{document}\n</boletim>");
        self.generate(&combined).await
    }
}

/// Mock completer for testing. Replays scripted results in order and
/// repeats the last one once the script is exhausted.
pub struct MockCompleter {
    kind: ProviderKind,
    script: Mutex<Vec<Result<String, ProviderError>>>,
    last: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl MockCompleter {
    /// Always answer `response`.
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    /// Answer each call with the next scripted result.
    pub fn scripted(script: Vec<Result<String, ProviderError>>) -> Self {
        let mut script = script;
        script.reverse();
        Self {
            kind: ProviderKind::Local,
            script: Mutex::new(script),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    /// Number of completion calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The prompt (or document + prompt) of the latest call.
    pub fn last_prompt(&self) -> Option<String> {
        self.last.lock().ok().and_then(|l| l.clone())
    }

    fn next(&self, prompt: String) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last.lock() {
            *last = Some(prompt);
        }
        let mut script = self
            .script
            .lock()
            .map_err(|_| ProviderError::Unavailable("mock poisoned".into()))?;
        if script.len() > 1 {
            if let Some(next) = script.pop() {
                return next;
            }
        }
        script
            .first()
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::Unavailable("mock script empty".into())))
    }
}

#[async_trait]
impl TextCompleter for MockCompleter {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.next(prompt.to_string())
    }

    async fn query_document(&self, document: &str, prompt: &str) -> Result<String, ProviderError> {
        self.next(format!("{document}\n---\n{prompt}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_returns_configured_response() {
        let client = MockCompleter::new("{\"disciplinas\":[]}");
        assert_eq!(client.complete("p").await.unwrap(), "{\"disciplinas\":[]}");
        assert_eq!(client.complete("p").await.unwrap(), "{\"disciplinas\":[]}");
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn mock_replays_script_then_repeats_last() {
        let client = MockCompleter::scripted(vec![
            Err(ProviderError::Timeout(1)),
            Ok("a".into()),
            Ok("b".into()),
        ]);
        assert!(matches!(client.complete("p").await, Err(ProviderError::Timeout(1))));
        assert_eq!(client.complete("p").await.unwrap(), "a");
        assert_eq!(client.complete("p").await.unwrap(), "b");
        assert_eq!(client.complete("p").await.unwrap(), "b");
    }

    #[tokio::test]
    async fn mock_records_document_queries() {
        let client = MockCompleter::new("{}").with_kind(ProviderKind::Hosted);
        client.query_document("ARTE 10", "extraia").await.unwrap();
        assert_eq!(client.kind(), ProviderKind::Hosted);
        assert_eq!(client.last_prompt().unwrap(), "ARTE 10\n---\nextraia");
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3.2", 60).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.timeout_secs, 60);
        assert_eq!(client.model(), "llama3.2");
        assert_eq!(client.kind(), ProviderKind::Local);
    }

    #[tokio::test]
    async fn unreachable_ollama_is_unavailable() {
        // Port 9 (discard) is closed on test hosts.
        let client = OllamaClient::new("http://127.0.0.1:9", "llama3.2", 5).unwrap();
        let err = client.complete("p").await.unwrap_err();
        assert!(err.is_transient());
    }
}
