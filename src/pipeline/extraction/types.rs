use std::path::Path;

use async_trait::async_trait;

use super::OcrError;
use crate::models::OcrEngineKind;

/// Text-extraction capability (OCR over an image file).
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Recognize the text of the image at `path`.
    async fn extract(&self, path: &Path) -> Result<String, OcrError>;

    fn engine(&self) -> OcrEngineKind;

    /// Whether overlapping `extract` calls are safe. Engines that return
    /// `false` are serialized by [`super::LazyExtractor`].
    fn supports_concurrent_calls(&self) -> bool {
        true
    }
}
