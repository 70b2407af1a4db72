//! `POST /api/upload`: one report-card photo in, computed report card out.
//!
//! The image is staged in a `NamedTempFile` under `UPLOAD_DIR`. The file is
//! removed when the handle drops, which covers success, failure and a client
//! disconnect (the handler future is dropped mid-pipeline).

use std::path::Path;
use std::time::Duration;

use axum::extract::multipart::Field;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{ComputedSubject, ReportCard};
use crate::pipeline::grading::DEFAULT_MINIMUM_PASSING_GRADE;

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "boletim";

/// Staged files are named `boletim-*`; nothing else in `UPLOAD_DIR` is touched.
const STAGING_PREFIX: &str = "boletim-";

#[derive(Deserialize)]
pub struct UploadQuery {
    #[serde(rename = "mediaMinima")]
    pub media_minima: Option<f64>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub dados: ReportCard<ComputedSubject>,
}

pub async fn upload(
    State(ctx): State<ApiContext>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let minimum = query.media_minima.unwrap_or(DEFAULT_MINIMUM_PASSING_GRADE);

    let mut staged = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            staged = Some(stage_image(field, &ctx.core.config.upload_dir).await?);
            break;
        }
    }
    let staged =
        staged.ok_or_else(|| ApiError::BadRequest("Nenhuma imagem foi enviada".into()))?;

    let dados = ctx
        .core
        .processor()
        .process_image(staged.path(), minimum)
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        dados,
    }))
}

async fn stage_image(field: Field<'_>, upload_dir: &Path) -> Result<NamedTempFile, ApiError> {
    let file_name = field.file_name().map(str::to_owned);
    let content_type = field.content_type().map(str::to_owned);
    if !is_image(content_type.as_deref(), file_name.as_deref()) {
        return Err(ApiError::BadRequest(
            "Apenas imagens são permitidas".into(),
        ));
    }

    let bytes = field.bytes().await?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Arquivo vazio".into()));
    }

    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Upload directory: {e}")))?;
    let suffix = file_name
        .as_deref()
        .and_then(|n| Path::new(n).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    let staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(&suffix)
        .tempfile_in(upload_dir)
        .map_err(|e| ApiError::Internal(format!("Failed to create staging file: {e}")))?;
    tokio::fs::write(staged.path(), &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to write staging file: {e}")))?;

    tracing::info!(
        size = bytes.len(),
        content_type = content_type.as_deref().unwrap_or("unknown"),
        "Upload staged"
    );
    Ok(staged)
}

/// Remove staged uploads left behind by a crash (drop never ran).
///
/// Only files older than `max_age` are removed, so a second instance sharing
/// the directory keeps its in-flight uploads. Returns the number removed.
pub fn cleanup_orphaned_uploads(upload_dir: &Path, max_age: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(upload_dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let is_staged = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(STAGING_PREFIX));
        if !is_staged {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok())
            .is_some_and(|age| age >= max_age);
        if stale && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(removed, dir = %upload_dir.display(), "Removed orphaned uploads");
    }
    removed
}

/// Declared `image/*`, or a file name whose extension is an image type.
fn is_image(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    if content_type.is_some_and(|ct| ct.starts_with("image/")) {
        return true;
    }
    file_name
        .and_then(|name| mime_guess::from_path(name).first())
        .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE)
}
