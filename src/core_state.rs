//! Process-wide application state shared by every request handler.
//!
//! Built once at startup from `AppConfig`. Holds the report-card processor,
//! whose OCR engines are lazily-initialized singletons; nothing in here is
//! mutated per request.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use crate::models::{LlmProvider, OcrEngineKind};
use crate::pipeline::extraction::{LazyExtractor, OllamaVisionOcr, TesseractCli, TextExtractor};
use crate::pipeline::processor::ReportCardProcessor;
use crate::pipeline::structuring::{OllamaClient, OpenAiClient, ProviderError, TextCompleter};

/// Failures that stop the service from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot build text-completion provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct CoreState {
    pub config: AppConfig,
    processor: Arc<ReportCardProcessor>,
    started_at: Instant,
}

impl CoreState {
    /// Wire providers and OCR engines from configuration. OCR engines are
    /// not probed here; they initialize on the first upload.
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let completer = build_completer(&config)?;
        let mut processor = ReportCardProcessor::new(
            lazy_extractor(config.ocr_engine, &config),
            completer,
            config.processor_settings(),
        );
        if let Some(fallback) = config.ocr_fallback_engine {
            processor = processor.with_fallback(lazy_extractor(fallback, &config));
        }

        tracing::info!(
            llm_provider = %config.llm_provider,
            llm_model = config.llm_model(),
            ocr_engine = %config.ocr_engine,
            ocr_fallback = config.ocr_fallback_engine.map(|e| e.as_str()).unwrap_or("none"),
            "Pipeline configured"
        );

        Ok(Self::with_processor(config, processor))
    }

    /// Use a prebuilt processor (tests, embedding).
    pub fn with_processor(config: AppConfig, processor: ReportCardProcessor) -> Self {
        Self {
            config,
            processor: Arc::new(processor),
            started_at: Instant::now(),
        }
    }

    pub fn processor(&self) -> &ReportCardProcessor {
        &self.processor
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

fn build_completer(config: &AppConfig) -> Result<Arc<dyn TextCompleter>, ProviderError> {
    let timeout = config.completion_timeout_secs;
    match config.llm_provider {
        LlmProvider::OpenAi => {
            let key = config
                .openai_api_key
                .as_deref()
                .ok_or_else(|| ProviderError::Unauthorized("OPENAI_API_KEY is not set".into()))?;
            let client = OpenAiClient::new(key, &config.openai_model, timeout)?
                .with_base_url(&config.openai_base_url);
            Ok(Arc::new(client))
        }
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient::new(
            &config.ollama_base_url,
            &config.ollama_model,
            timeout,
        )?)),
    }
}

fn lazy_extractor(kind: OcrEngineKind, config: &AppConfig) -> Arc<LazyExtractor> {
    match kind {
        OcrEngineKind::Tesseract => {
            let binary = config.tesseract_bin.clone();
            Arc::new(LazyExtractor::new(kind, move || {
                let binary = binary.clone();
                async move {
                    TesseractCli::detect(binary)
                        .await
                        .map(|engine| Arc::new(engine) as Arc<dyn TextExtractor>)
                }
            }))
        }
        OcrEngineKind::Vision => {
            let base_url = config.ollama_base_url.clone();
            let model = config.ocr_vision_model.clone();
            let timeout = config.ocr_timeout_secs;
            Arc::new(LazyExtractor::new(kind, move || {
                let engine = OllamaVisionOcr::new(&base_url, &model, timeout);
                async move { engine.map(|engine| Arc::new(engine) as Arc<dyn TextExtractor>) }
            }))
        }
    }
}
