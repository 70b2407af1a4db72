//! Pipeline diagnostic dump: writes the intermediates of one upload to disk.
//!
//! Disabled unless `BOLETIM_DUMP_DIR` is set. Content never reaches the logs
//! at info level, so this is the only way to inspect what the OCR engine and
//! the model actually produced.
//!
//! **Output structure**:
//! ```text
//! {dump_dir}/{request_id}/
//!   01-ocr-text.txt
//!   02-prompt.txt
//!   03-model-response.txt
//!   04-recovered.json
//!   05-result.json
//! ```

use std::path::{Path, PathBuf};

use uuid::Uuid;

pub const OCR_TEXT_FILE: &str = "01-ocr-text.txt";
pub const PROMPT_FILE: &str = "02-prompt.txt";
pub const MODEL_RESPONSE_FILE: &str = "03-model-response.txt";
pub const RECOVERED_FILE: &str = "04-recovered.json";
pub const RESULT_FILE: &str = "05-result.json";

/// Returns the dump directory for a request, creating it.
///
/// Returns `None` (with a warning) if directory creation fails. Never
/// blocks the pipeline.
pub fn dump_dir_for(base: &Path, request_id: &Uuid) -> Option<PathBuf> {
    let dir = base.join(request_id.to_string());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(
            path = %dir.display(),
            error = %e,
            "Diagnostic dump: failed to create directory"
        );
        return None;
    }

    Some(dir)
}

/// Write a JSON artifact, pretty-printed.
pub fn dump_json<T: serde::Serialize>(dir: &Path, filename: &str, value: &T) {
    let path = dir.join(filename);
    match serde_json::to_string_pretty(value) {
        Ok(json) => match std::fs::write(&path, json.as_bytes()) {
            Ok(()) => tracing::debug!(
                path = %path.display(),
                size = json.len(),
                "Diagnostic dump: JSON written"
            ),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Diagnostic dump: failed to write JSON"
            ),
        },
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to serialize JSON"
        ),
    }
}

/// Write a text artifact (OCR text, prompt, raw model response).
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, text.as_bytes()) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = text.len(),
            "Diagnostic dump: text written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write text"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_dir_for_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let request_id = Uuid::new_v4();
        let dir = dump_dir_for(tmp.path(), &request_id).unwrap();

        assert!(dir.exists());
        assert!(dir.ends_with(request_id.to_string()));
    }

    #[test]
    fn dump_dir_for_unwritable_base_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        assert!(dump_dir_for(&file, &Uuid::new_v4()).is_none());
    }

    #[test]
    fn dump_json_writes_pretty_json() {
        let tmp = tempfile::tempdir().unwrap();
        let value = serde_json::json!({"aluno": "ANA", "ano": 2024});

        dump_json(tmp.path(), RECOVERED_FILE, &value);

        let content = std::fs::read_to_string(tmp.path().join(RECOVERED_FILE)).unwrap();
        assert!(content.contains("\"aluno\": \"ANA\""));
        assert!(content.contains('\n'));
    }

    #[test]
    fn dump_text_writes_text() {
        let tmp = tempfile::tempdir().unwrap();
        dump_text(tmp.path(), OCR_TEXT_FILE, "MATEMÁTICA 9,0");

        let content = std::fs::read_to_string(tmp.path().join(OCR_TEXT_FILE)).unwrap();
        assert_eq!(content, "MATEMÁTICA 9,0");
    }

    #[test]
    fn write_failures_do_not_panic() {
        let bad_dir = Path::new("/nonexistent/path/that/does/not/exist");
        dump_json(bad_dir, "test.json", &"data");
        dump_text(bad_dir, "test.txt", "data");
    }
}
