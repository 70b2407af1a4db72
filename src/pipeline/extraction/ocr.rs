use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::types::TextExtractor;
use super::OcrError;
use crate::models::OcrEngineKind;

/// Language data preferred for Brazilian report cards.
const PRIMARY_LANGUAGE: &str = "por";
/// Used when Portuguese data is missing or a Portuguese run fails.
const FALLBACK_LANGUAGE: &str = "eng";

/// Tesseract OCR through its command-line binary.
///
/// Each call spawns its own process, so calls may overlap.
#[derive(Debug)]
pub struct TesseractCli {
    binary: PathBuf,
    /// Languages to try, in order.
    languages: Vec<String>,
}

impl TesseractCli {
    /// Probe the binary (`--version`, `--list-langs`) and choose languages.
    /// Portuguese first, English as fallback.
    pub async fn detect(binary: impl Into<PathBuf>) -> Result<Self, OcrError> {
        let binary = binary.into();

        let version = run(Command::new(&binary).arg("--version"), &binary).await?;
        let version_text = String::from_utf8_lossy(if version.stdout.is_empty() {
            &version.stderr
        } else {
            &version.stdout
        })
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();

        let listing = run(Command::new(&binary).arg("--list-langs"), &binary).await?;
        // Older releases print the list to stderr.
        let mut available = parse_language_list(&String::from_utf8_lossy(&listing.stdout));
        if available.is_empty() {
            available = parse_language_list(&String::from_utf8_lossy(&listing.stderr));
        }

        let languages = choose_languages(&available);
        if languages.is_empty() {
            return Err(OcrError::Unavailable(
                "tesseract has no language data installed".into(),
            ));
        }
        if languages[0] != PRIMARY_LANGUAGE {
            tracing::warn!(
                language = %languages[0],
                "Portuguese tesseract data not found, accuracy on report cards will suffer"
            );
        }

        tracing::info!(
            version = %version_text,
            languages = %languages.join(","),
            "Tesseract OCR ready"
        );

        Ok(Self { binary, languages })
    }

    /// Use explicit languages without probing the binary.
    pub fn with_languages(binary: impl Into<PathBuf>, languages: &[&str]) -> Self {
        Self {
            binary: binary.into(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    async fn recognize(&self, path: &Path, lang: &str) -> Result<String, OcrError> {
        let output = run(
            Command::new(&self.binary)
                .arg(path)
                .arg("stdout")
                .arg("-l")
                .arg(lang),
            &self.binary,
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(format!(
                "tesseract exited with {} ({lang}): {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TextExtractor for TesseractCli {
    async fn extract(&self, path: &Path) -> Result<String, OcrError> {
        let mut last_error = OcrError::Unavailable("no tesseract language configured".into());

        for lang in &self.languages {
            let start = std::time::Instant::now();
            match self.recognize(path, lang).await {
                Ok(text) => {
                    tracing::debug!(
                        lang = %lang,
                        text_len = text.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Tesseract recognition complete"
                    );
                    return Ok(text);
                }
                Err(e @ OcrError::Unavailable(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(lang = %lang, error = %e, "Tesseract run failed, trying next language");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn engine(&self) -> OcrEngineKind {
        OcrEngineKind::Tesseract
    }
}

/// Spawn a child that is killed if the request is dropped.
async fn run(cmd: &mut Command, binary: &Path) -> Result<Output, OcrError> {
    cmd.kill_on_drop(true).output().await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            OcrError::Unavailable(format!("{} not found", binary.display()))
        } else {
            OcrError::Unavailable(format!("cannot run {}: {e}", binary.display()))
        }
    })
}

/// Parse `tesseract --list-langs` output, skipping the header line.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.contains(' ') && !l.ends_with(':'))
        .map(str::to_string)
        .collect()
}

fn choose_languages(available: &[String]) -> Vec<String> {
    let has = |lang: &str| available.iter().any(|a| a == lang);
    let mut out = Vec::new();
    for lang in [PRIMARY_LANGUAGE, FALLBACK_LANGUAGE] {
        if has(lang) {
            out.push(lang.to_string());
        }
    }
    if out.is_empty() {
        if let Some(other) = available.iter().find(|l| l.as_str() != "osd") {
            out.push(other.clone());
        }
    }
    out
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    result: Result<String, OcrError>,
    kind: OcrEngineKind,
    concurrent: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self::with_result(Ok(text.to_string()))
    }

    pub fn failing(err: OcrError) -> Self {
        Self::with_result(Err(err))
    }

    fn with_result(result: Result<String, OcrError>) -> Self {
        Self {
            result,
            kind: OcrEngineKind::Tesseract,
            concurrent: true,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_kind(mut self, kind: OcrEngineKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark the engine as unsafe for overlapping calls.
    pub fn sequential(mut self) -> Self {
        self.concurrent = false;
        self
    }

    /// Hold each call for `delay` so overlap becomes observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for MockOcrEngine {
    async fn extract(&self, _path: &Path) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.result.clone()
    }

    fn engine(&self) -> OcrEngineKind {
        self.kind
    }

    fn supports_concurrent_calls(&self) -> bool {
        self.concurrent
    }
}
