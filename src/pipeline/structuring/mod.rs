pub mod types;
pub mod prompt;
pub mod parser;
pub mod sanitize;
pub mod validation;
pub mod ollama_types;
pub mod ollama;
pub mod openai;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use sanitize::*;
pub use validation::*;
pub use ollama::*;
pub use openai::*;

use thiserror::Error;

/// Failures of a text-completion provider.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider timed out after {0}s")]
    Timeout(u64),

    #[error("Provider rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("Model not available to this account: {0}")]
    ModelAccess(String),

    #[error("Provider returned error (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Disconnects, timeouts, throttling and server-side errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Unavailable(_) | ProviderError::Timeout(_) => true,
            ProviderError::Rejected { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Unauthorized(_)
            | ProviderError::ModelAccess(_)
            | ProviderError::MalformedResponse(_) => false,
        }
    }

    /// Map an HTTP error status to the matching variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => ProviderError::Unauthorized(body),
            403 | 404 => ProviderError::ModelAccess(body),
            _ => ProviderError::Rejected { status, body },
        }
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_transport(err: &reqwest::Error, endpoint: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout_secs)
        } else if err.is_connect() {
            ProviderError::Unavailable(format!("cannot connect to {endpoint}"))
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

/// Model output that no recovery strategy could turn into a JSON object.
#[derive(Error, Debug, Clone)]
#[error(
    "Model output is not valid JSON ({} subject name(s) partially recovered)",
    partial_subjects.len()
)]
pub struct MalformedExtractionError {
    /// First characters of the raw output.
    pub head: String,
    /// Last characters of the raw output.
    pub tail: String,
    /// Subject names found by pattern matching. Diagnostic only.
    pub partial_subjects: Vec<String>,
}

/// The model output parsed, but its root cannot be a report card.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid report card: {0}")]
pub struct InvalidReportCardError(pub String);
