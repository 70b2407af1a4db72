pub mod types;
pub mod ocr;
pub mod vision_ocr;
pub mod shared;

pub use types::*;
pub use ocr::*;
pub use vision_ocr::*;
pub use shared::*;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum OcrError {
    /// The engine is not installed, not reachable, or could not start.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but produced no usable text.
    #[error("OCR failed: {0}")]
    Failed(String),
}

impl OcrError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, OcrError::Unavailable(_))
    }
}
