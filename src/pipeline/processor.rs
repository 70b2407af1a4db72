//! Report-card processing orchestrator.
//!
//! Single entry point that drives one upload through the full pipeline:
//! OCR → model query → JSON recovery → sanitization → grade computation.
//!
//! Uses trait-based DI for every external engine (`TextExtractor`,
//! `TextCompleter`) so the orchestrator stays testable with mocks. Each run
//! is independent; the only shared resource is the OCR handle behind the
//! extractor. Dropping the returned future cancels in-flight provider calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::models::{ComputedSubject, ProviderKind, ReportCard};
use crate::pipeline::diagnostic;
use crate::pipeline::extraction::{OcrError, TextExtractor};
use crate::pipeline::grading::{compute_subject, compute_subjects, MAX_GRADE};
use crate::pipeline::structuring::{
    build_extraction_prompt, recover_json_object, sanitize_ocr_text, sanitize_report_card,
    sanitize_subjects, truncate_for_prompt, InvalidReportCardError, MalformedExtractionError,
    ProviderError, TextCompleter, DEFAULT_PROMPT_TEXT_BUDGET, EXTRACTION_INSTRUCTIONS,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A pipeline failure, tagged with the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("text extraction: {0}")]
    TextExtraction(#[source] OcrError),

    #[error("model query: {0}")]
    ModelQuery(#[source] ProviderError),

    #[error("JSON recovery: {0}")]
    JsonRecovery(#[source] MalformedExtractionError),

    #[error("sanitization: {0}")]
    Sanitization(#[source] InvalidReportCardError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable stage name for logs and error codes.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::TextExtraction(_) => "text_extraction",
            PipelineError::ModelQuery(_) => "model_query",
            PipelineError::JsonRecovery(_) => "json_recovery",
            PipelineError::Sanitization(_) => "sanitization",
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::Io(_) => "io",
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Progress of one upload. A failure is terminal from any stage and is
/// reported as the `PipelineError` of the stage that was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Idle,
    TextExtracted,
    ModelQueried,
    JsonRecovered,
    Sanitized,
    Computed,
    Done,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TextExtracted => "text_extracted",
            Self::ModelQueried => "model_queried",
            Self::JsonRecovered => "json_recovered",
            Self::Sanitized => "sanitized",
            Self::Computed => "computed",
            Self::Done => "done",
        }
    }
}

fn advance(stage: &mut ProcessingStage, next: ProcessingStage) {
    tracing::debug!(from = stage.as_str(), to = next.as_str(), "Pipeline stage");
    *stage = next;
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Budgets and retry policy for one processor.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub completion_timeout: Duration,
    pub ocr_timeout: Duration,
    /// OCR characters passed to the model.
    pub prompt_text_budget: usize,
    /// Retries after the first attempt, for transient provider errors.
    pub max_retries: u32,
    /// Doubled after each retry.
    pub initial_backoff: Duration,
    /// Enables the diagnostic dump when set.
    pub dump_dir: Option<PathBuf>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(300),
            ocr_timeout: Duration::from_secs(120),
            prompt_text_budget: DEFAULT_PROMPT_TEXT_BUDGET,
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            dump_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives uploads through the pipeline. Cheap to share behind an `Arc`.
pub struct ReportCardProcessor {
    extractor: Arc<dyn TextExtractor>,
    fallback: Option<Arc<dyn TextExtractor>>,
    completer: Arc<dyn TextCompleter>,
    settings: ProcessorSettings,
}

impl ReportCardProcessor {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        completer: Arc<dyn TextCompleter>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            extractor,
            fallback: None,
            completer,
            settings,
        }
    }

    /// Alternate OCR engine tried once when the primary fails.
    pub fn with_fallback(mut self, fallback: Arc<dyn TextExtractor>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn completer(&self) -> &dyn TextCompleter {
        self.completer.as_ref()
    }

    pub fn extractor(&self) -> &dyn TextExtractor {
        self.extractor.as_ref()
    }

    pub fn fallback(&self) -> Option<&dyn TextExtractor> {
        self.fallback.as_deref()
    }

    /// Full pipeline for one uploaded image.
    ///
    /// Either the whole report card is returned or the first failing stage's
    /// error; no partial result.
    pub async fn process_image(
        &self,
        image: &Path,
        minimum_passing_grade: f64,
    ) -> Result<ReportCard<ComputedSubject>, PipelineError> {
        validate_minimum(minimum_passing_grade)?;

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("process_report_card", request_id = %request_id);

        async {
            let start = Instant::now();
            let mut stage = ProcessingStage::Idle;
            let result = self
                .run_stages(image, minimum_passing_grade, &request_id, &mut stage)
                .await;

            match &result {
                Ok(card) => tracing::info!(
                    subjects = card.subjects.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Report card processed"
                ),
                Err(e) => tracing::warn!(
                    stage = e.stage(),
                    last_completed = stage.as_str(),
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Report card processing failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        image: &Path,
        minimum_passing_grade: f64,
        request_id: &Uuid,
        stage: &mut ProcessingStage,
    ) -> Result<ReportCard<ComputedSubject>, PipelineError> {
        let dump = self
            .settings
            .dump_dir
            .as_deref()
            .and_then(|base| diagnostic::dump_dir_for(base, request_id));
        let request_tag = request_id.to_string();

        // Idle → TextExtracted
        let text = self
            .extract_text(image, &request_tag)
            .await
            .map_err(PipelineError::TextExtraction)?;
        if let Some(dir) = &dump {
            diagnostic::dump_text(dir, diagnostic::OCR_TEXT_FILE, &text);
        }
        advance(stage, ProcessingStage::TextExtracted);

        // TextExtracted → ModelQueried
        let response = self
            .query_model(&text, dump.as_deref())
            .await
            .map_err(PipelineError::ModelQuery)?;
        if let Some(dir) = &dump {
            diagnostic::dump_text(dir, diagnostic::MODEL_RESPONSE_FILE, &response);
        }
        advance(stage, ProcessingStage::ModelQueried);

        // ModelQueried → JsonRecovered
        let recovered = recover_json_object(&response).map_err(PipelineError::JsonRecovery)?;
        if let Some(dir) = &dump {
            diagnostic::dump_json(dir, diagnostic::RECOVERED_FILE, &recovered);
        }
        advance(stage, ProcessingStage::JsonRecovered);

        // JsonRecovered → Sanitized
        let card = sanitize_report_card(&recovered).map_err(PipelineError::Sanitization)?;
        advance(stage, ProcessingStage::Sanitized);

        // Sanitized → Computed
        let computed = card.map_subjects(|s| compute_subject(s, minimum_passing_grade));
        if let Some(dir) = &dump {
            diagnostic::dump_json(dir, diagnostic::RESULT_FILE, &computed);
        }
        advance(stage, ProcessingStage::Computed);

        advance(stage, ProcessingStage::Done);
        Ok(computed)
    }

    /// Recompute already-extracted subjects with a (possibly new) threshold.
    /// Entries are sanitized again first; sanitizing sanitized data is a no-op.
    pub fn recompute(
        &self,
        subjects: &[Value],
        minimum_passing_grade: f64,
    ) -> Result<Vec<ComputedSubject>, PipelineError> {
        validate_minimum(minimum_passing_grade)?;
        if subjects.is_empty() {
            return Err(PipelineError::InvalidRequest("subject list is empty".into()));
        }

        let sanitized = sanitize_subjects(subjects);
        if sanitized.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "no subject has a usable name".into(),
            ));
        }

        Ok(compute_subjects(sanitized, minimum_passing_grade))
    }

    /// OCR with the primary engine, then the fallback engine if configured.
    async fn extract_text(&self, image: &Path, request_id: &str) -> Result<String, OcrError> {
        let primary_err = match self.extract_with(self.extractor.as_ref(), image, request_id).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };
        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };

        tracing::warn!(
            engine = %self.extractor.engine(),
            fallback = %fallback.engine(),
            error = %primary_err,
            "Primary OCR failed, trying fallback engine"
        );
        self.extract_with(fallback.as_ref(), image, request_id).await
    }

    async fn extract_with(
        &self,
        engine: &dyn TextExtractor,
        image: &Path,
        request_id: &str,
    ) -> Result<String, OcrError> {
        let secs = self.settings.ocr_timeout.as_secs();
        let raw = tokio::time::timeout(self.settings.ocr_timeout, engine.extract(image))
            .await
            .map_err(|_| OcrError::Failed(format!("OCR timed out after {secs}s")))??;

        let text = sanitize_ocr_text(&raw, Some(request_id));
        if text.is_empty() {
            return Err(OcrError::Failed("no text recognized".into()));
        }

        tracing::debug!(
            engine = %engine.engine(),
            raw_len = raw.len(),
            text_len = text.len(),
            "OCR text extracted"
        );
        Ok(text)
    }

    /// Build the request for the provider kind and send it with retries.
    async fn query_model(&self, text: &str, dump: Option<&Path>) -> Result<String, ProviderError> {
        let budget = self.settings.prompt_text_budget;

        match self.completer.kind() {
            ProviderKind::Local => {
                let prompt = build_extraction_prompt(text, budget);
                if let Some(dir) = dump {
                    diagnostic::dump_text(dir, diagnostic::PROMPT_FILE, &prompt);
                }
                tracing::debug!(prompt_len = prompt.len(), "Querying local model");
                self.with_retries(|| self.completer.complete(&prompt)).await
            }
            ProviderKind::Hosted => {
                let document = truncate_for_prompt(text, budget);
                if let Some(dir) = dump {
                    diagnostic::dump_text(
                        dir,
                        diagnostic::PROMPT_FILE,
                        &format!("{document}\n\n---\n\n{EXTRACTION_INSTRUCTIONS}"),
                    );
                }
                tracing::debug!(document_len = document.len(), "Querying hosted model");
                self.with_retries(|| {
                    self.completer
                        .query_document(&document, EXTRACTION_INSTRUCTIONS)
                })
                .await
            }
        }
    }

    /// Run `call` with a per-attempt timeout, retrying transient failures
    /// with exponential backoff.
    async fn with_retries<F, Fut>(&self, mut call: F) -> Result<String, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<String, ProviderError>>,
    {
        let timeout = self.settings.completion_timeout;
        let mut backoff = self.settings.initial_backoff;
        let mut attempt = 0u32;

        loop {
            let result = match tokio::time::timeout(timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
            };

            match result {
                Ok(response) => {
                    tracing::debug!(
                        attempt = attempt + 1,
                        response_len = response.len(),
                        "Model response received"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        provider = self.completer.name(),
                        attempt,
                        max_retries = self.settings.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// The threshold must be a usable grade.
fn validate_minimum(minimum_passing_grade: f64) -> Result<(), PipelineError> {
    if minimum_passing_grade.is_finite()
        && minimum_passing_grade > 0.0
        && minimum_passing_grade <= MAX_GRADE
    {
        Ok(())
    } else {
        Err(PipelineError::InvalidRequest(format!(
            "minimum passing grade must be in (0, 10], got {minimum_passing_grade}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
