//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub llm_provider: &'static str,
    pub llm_model: String,
    pub ocr_engine: &'static str,
    pub ocr_fallback_engine: Option<&'static str>,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// `GET /api/health`: configured provider and OCR engines. Does not touch
/// the pipeline, so it answers even when no OCR engine has initialized yet.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let config = &ctx.core.config;
    Json(HealthResponse {
        status: "OK",
        message: "Servidor rodando",
        llm_provider: config.llm_provider.as_str(),
        llm_model: config.llm_model().to_string(),
        ocr_engine: config.ocr_engine.as_str(),
        ocr_fallback_engine: config.ocr_fallback_engine.map(|e| e.as_str()),
        version: crate::config::APP_VERSION,
        uptime_secs: ctx.core.uptime_secs(),
    })
}
