//! `POST /api/calculate`: recompute averages with a new passing grade.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::ComputedSubject;
use crate::pipeline::grading::DEFAULT_MINIMUM_PASSING_GRADE;

#[derive(Deserialize)]
pub struct CalculateRequest {
    /// Raw subject records; re-sanitized before computing.
    #[serde(default)]
    pub disciplinas: Option<Vec<Value>>,
    #[serde(rename = "mediaMinima", default)]
    pub media_minima: Option<f64>,
}

#[derive(Serialize)]
pub struct CalculateResponse {
    pub success: bool,
    pub disciplinas: Vec<ComputedSubject>,
}

pub async fn recalculate(
    State(ctx): State<ApiContext>,
    payload: Result<Json<CalculateRequest>, JsonRejection>,
) -> Result<Json<CalculateResponse>, ApiError> {
    let Json(request) = payload?;
    let subjects = request
        .disciplinas
        .ok_or_else(|| ApiError::BadRequest("Dados inválidos: 'disciplinas' ausente".into()))?;
    let minimum = request.media_minima.unwrap_or(DEFAULT_MINIMUM_PASSING_GRADE);

    let disciplinas = ctx.core.processor().recompute(&subjects, minimum)?;
    tracing::debug!(subjects = disciplinas.len(), minimum, "Averages recomputed");

    Ok(Json(CalculateResponse {
        success: true,
        disciplinas,
    }))
}
