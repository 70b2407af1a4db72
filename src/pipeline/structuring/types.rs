use async_trait::async_trait;

use super::ProviderError;
use crate::models::ProviderKind;

/// Text-completion capability (language model).
///
/// Local providers are driven with `complete` and the whole prompt; hosted
/// providers receive the OCR text through `query_document`.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    /// Provider name for logs and the health endpoint.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Single-shot completion of a self-contained prompt.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Answer `prompt` about `document`, which is passed as ingested context.
    async fn query_document(&self, document: &str, prompt: &str) -> Result<String, ProviderError>;
}
