// Process-wide OCR handle: built on first use, shared afterwards.
// A failed initialization is not cached, so the next request retries it.
// Engines that cannot take overlapping calls are serialized here.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::{Mutex, OnceCell};

use super::types::TextExtractor;
use super::OcrError;
use crate::models::OcrEngineKind;

type Factory =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn TextExtractor>, OcrError>> + Send + Sync>;

/// Lazily-initialized, lock-guarded OCR engine.
pub struct LazyExtractor {
    kind: OcrEngineKind,
    factory: Factory,
    cell: OnceCell<Arc<dyn TextExtractor>>,
    gate: Mutex<()>,
}

impl LazyExtractor {
    pub fn new<F, Fut>(kind: OcrEngineKind, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn TextExtractor>, OcrError>> + Send + 'static,
    {
        Self {
            kind,
            factory: Box::new(move || factory().boxed()),
            cell: OnceCell::new(),
            gate: Mutex::new(()),
        }
    }

    /// Wrap an engine that is already built.
    pub fn ready(extractor: Arc<dyn TextExtractor>) -> Self {
        let kind = extractor.engine();
        Self {
            kind,
            factory: Box::new(|| {
                async { Err(OcrError::Unavailable("engine already initialized".into())) }.boxed()
            }),
            cell: OnceCell::new_with(Some(extractor)),
            gate: Mutex::new(()),
        }
    }

    /// The shared engine, initializing it on first call.
    pub async fn get(&self) -> Result<Arc<dyn TextExtractor>, OcrError> {
        self.cell
            .get_or_try_init(|| async {
                tracing::debug!(engine = %self.kind, "Initializing OCR engine");
                let result = (self.factory)().await;
                if let Err(e) = &result {
                    tracing::warn!(engine = %self.kind, error = %e, "OCR engine initialization failed");
                }
                result
            })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

#[async_trait]
impl TextExtractor for LazyExtractor {
    async fn extract(&self, path: &Path) -> Result<String, OcrError> {
        let engine = self.get().await?;
        if engine.supports_concurrent_calls() {
            return engine.extract(path).await;
        }
        let _turn = self.gate.lock().await;
        engine.extract(path).await
    }

    fn engine(&self) -> OcrEngineKind {
        self.kind
    }
}
