use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::models::{LlmProvider, OcrEngineKind};
use crate::pipeline::processor::ProcessorSettings;
use crate::pipeline::structuring::ollama_types::is_valid_model_name;
use crate::pipeline::structuring::{DEFAULT_OPENAI_BASE_URL, DEFAULT_PROMPT_TEXT_BUDGET};

/// Application-level constants
pub const APP_NAME: &str = "Boletim";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_PORT: u16 = 5001;
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
const DEFAULT_VISION_MODEL: &str = "llama3.2-vision";
const DEFAULT_TESSERACT_BIN: &str = "tesseract";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Keys copied from setup guides without being replaced.
const PLACEHOLDER_KEYS: &[&str] = &["sua-chave", "your-api-key"];

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "boletim_lib=info,boletim=info,tower_http=warn"
}

#[derive(Error, Debug, PartialEq)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub llm_provider: LlmProvider,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ocr_engine: OcrEngineKind,
    pub ocr_fallback_engine: Option<OcrEngineKind>,
    pub ocr_vision_model: String,
    pub tesseract_bin: PathBuf,
    pub completion_timeout_secs: u64,
    pub ocr_timeout_secs: u64,
    pub prompt_text_budget: usize,
    pub max_provider_retries: u32,
    pub retry_initial_backoff_ms: u64,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cors_origin: String,
    pub dump_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            llm_provider: LlmProvider::OpenAi,
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.into(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.into(),
            ollama_model: DEFAULT_OLLAMA_MODEL.into(),
            ocr_engine: OcrEngineKind::Tesseract,
            ocr_fallback_engine: None,
            ocr_vision_model: DEFAULT_VISION_MODEL.into(),
            tesseract_bin: PathBuf::from(DEFAULT_TESSERACT_BIN),
            completion_timeout_secs: 300,
            ocr_timeout_secs: 120,
            prompt_text_budget: DEFAULT_PROMPT_TEXT_BUDGET,
            max_provider_retries: 3,
            retry_initial_backoff_ms: 2000,
            upload_dir: std::env::temp_dir(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origin: DEFAULT_CORS_ORIGIN.into(),
            dump_dir: None,
        }
    }
}

impl AppConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut cfg = Self::default();

        if let Some(v) = get("HOST") {
            cfg.host = parse("HOST", &v)?;
        }
        if let Some(v) = get("PORT") {
            cfg.port = parse("PORT", &v)?;
        }

        if let Some(v) = get("LLM_PROVIDER") {
            cfg.llm_provider = parse("LLM_PROVIDER", &v.to_lowercase())?;
        }
        cfg.openai_api_key = get("OPENAI_API_KEY");
        if let Some(v) = get("OPENAI_MODEL") {
            cfg.openai_model = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            cfg.openai_base_url = url("OPENAI_BASE_URL", v)?;
        }
        if let Some(v) = get("OLLAMA_BASE_URL") {
            cfg.ollama_base_url = url("OLLAMA_BASE_URL", v)?;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            cfg.ollama_model = model_name("OLLAMA_MODEL", v)?;
        }

        if let Some(v) = get("OCR_ENGINE") {
            cfg.ocr_engine = parse("OCR_ENGINE", &v.to_lowercase())?;
        }
        if let Some(v) = get("OCR_FALLBACK_ENGINE") {
            cfg.ocr_fallback_engine = Some(parse("OCR_FALLBACK_ENGINE", &v.to_lowercase())?);
        }
        if let Some(v) = get("OCR_VISION_MODEL") {
            cfg.ocr_vision_model = model_name("OCR_VISION_MODEL", v)?;
        }
        if let Some(v) = get("TESSERACT_BIN") {
            cfg.tesseract_bin = PathBuf::from(v);
        }

        if let Some(v) = get("COMPLETION_TIMEOUT_SECS") {
            cfg.completion_timeout_secs = positive("COMPLETION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("OCR_TIMEOUT_SECS") {
            cfg.ocr_timeout_secs = positive("OCR_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("PROMPT_TEXT_BUDGET") {
            cfg.prompt_text_budget = positive("PROMPT_TEXT_BUDGET", &v)?;
        }
        if let Some(v) = get("MAX_PROVIDER_RETRIES") {
            cfg.max_provider_retries = parse("MAX_PROVIDER_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_INITIAL_BACKOFF_MS") {
            cfg.retry_initial_backoff_ms = parse("RETRY_INITIAL_BACKOFF_MS", &v)?;
        }

        if let Some(v) = get("UPLOAD_DIR") {
            cfg.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MAX_UPLOAD_BYTES") {
            cfg.max_upload_bytes = positive("MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = get("CORS_ORIGIN") {
            cfg.cors_origin = cors_origin(v)?;
        }
        cfg.dump_dir = get("BOLETIM_DUMP_DIR").map(PathBuf::from);

        cfg.resolve_provider();
        cfg.resolve_fallback_engine();
        Ok(cfg)
    }

    /// A hosted provider without a real key falls back to the local one.
    fn resolve_provider(&mut self) {
        if self.llm_provider != LlmProvider::OpenAi {
            return;
        }
        let usable = self.openai_api_key.as_deref().is_some_and(|key| {
            let lower = key.to_lowercase();
            !PLACEHOLDER_KEYS.iter().any(|p| lower.contains(p))
        });
        if !usable {
            tracing::warn!("OPENAI_API_KEY missing or placeholder, falling back to ollama");
            self.llm_provider = LlmProvider::Ollama;
            self.openai_api_key = None;
        }
    }

    fn resolve_fallback_engine(&mut self) {
        if self.ocr_fallback_engine == Some(self.ocr_engine) {
            tracing::warn!(
                engine = %self.ocr_engine,
                "OCR_FALLBACK_ENGINE equals OCR_ENGINE, fallback disabled"
            );
            self.ocr_fallback_engine = None;
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Model name of the active text-completion provider.
    pub fn llm_model(&self) -> &str {
        match self.llm_provider {
            LlmProvider::OpenAi => &self.openai_model,
            LlmProvider::Ollama => &self.ollama_model,
        }
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            completion_timeout: Duration::from_secs(self.completion_timeout_secs),
            ocr_timeout: Duration::from_secs(self.ocr_timeout_secs),
            prompt_text_budget: self.prompt_text_budget,
            max_retries: self.max_provider_retries,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            dump_dir: self.dump_dir.clone(),
        }
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError {
        var,
        reason: format!("'{value}': {e}"),
    })
}

fn positive<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let n: T = parse(var, value)?;
    if n == T::default() {
        return Err(ConfigError {
            var,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(n)
}

fn url(var: &'static str, value: String) -> Result<String, ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value)
    } else {
        Err(ConfigError {
            var,
            reason: format!("'{value}' is not an http(s) URL"),
        })
    }
}

/// `*` allows any origin; anything else must be an http(s) origin.
fn cors_origin(value: String) -> Result<String, ConfigError> {
    if value == "*" {
        return Ok(value);
    }
    url("CORS_ORIGIN", value)
}

fn model_name(var: &'static str, value: String) -> Result<String, ConfigError> {
    if is_valid_model_name(&value) {
        Ok(value)
    } else {
        Err(ConfigError {
            var,
            reason: format!("'{value}' is not a valid model name"),
        })
    }
}
