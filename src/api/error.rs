//! API error types with structured JSON responses.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::processor::PipelineError;
use crate::pipeline::structuring::ProviderError;

/// Error body. `success` is always false so clients can branch on one field.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                self.to_string(),
            ),
            ApiError::Pipeline(err) => pipeline_response(err),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            success: false,
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

fn pipeline_response(err: &PipelineError) -> (StatusCode, &'static str, String) {
    match err {
        PipelineError::InvalidRequest(detail) => {
            (StatusCode::BAD_REQUEST, "INVALID_REQUEST", detail.clone())
        }
        PipelineError::ModelQuery(ProviderError::Unauthorized(_)) => (
            StatusCode::UNAUTHORIZED,
            "PROVIDER_UNAUTHORIZED",
            "The language-model provider rejected the configured API key".to_string(),
        ),
        PipelineError::ModelQuery(ProviderError::ModelAccess(_)) => (
            StatusCode::FORBIDDEN,
            "PROVIDER_MODEL_ACCESS",
            "The configured model is not available to this provider account".to_string(),
        ),
        PipelineError::Io(e) => {
            tracing::error!(error = %e, "Pipeline I/O error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(stage = other.stage(), error = %other, "Pipeline failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                stage_code(other),
                stage_message(other).to_string(),
            )
        }
    }
}

fn stage_code(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::TextExtraction(_) => "OCR_FAILED",
        PipelineError::ModelQuery(_) => "PROVIDER_FAILED",
        PipelineError::JsonRecovery(_) => "MALFORMED_EXTRACTION",
        PipelineError::Sanitization(_) => "INVALID_REPORT_CARD",
        PipelineError::InvalidRequest(_) => "INVALID_REQUEST",
        PipelineError::Io(_) => "INTERNAL",
    }
}

fn stage_message(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::TextExtraction(e) if e.is_unavailable() => {
            "No OCR engine is available to read the image"
        }
        PipelineError::TextExtraction(_) => "Could not read text from the image",
        PipelineError::ModelQuery(_) => "The language-model provider did not answer",
        PipelineError::JsonRecovery(_) => "The model answer could not be read as a report card",
        PipelineError::Sanitization(_) => "The model answer is not a report card",
        PipelineError::InvalidRequest(_) | PipelineError::Io(_) => "Request failed",
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use crate::pipeline::extraction::OcrError;
    use crate::pipeline::structuring::MalformedExtractionError;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn bad_request_returns_400() {
        let response = ApiError::BadRequest("Nenhum arquivo enviado".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "Nenhum arquivo enviado");
    }

    #[tokio::test]
    async fn invalid_request_returns_400() {
        let err = PipelineError::InvalidRequest("subject list is empty".into());
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn provider_auth_returns_401() {
        let err = PipelineError::ModelQuery(ProviderError::Unauthorized("invalid_api_key".into()));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "PROVIDER_UNAUTHORIZED");
        assert!(!json["error"]["message"].as_str().unwrap().contains("invalid_api_key"));
    }

    #[tokio::test]
    async fn provider_model_access_returns_403() {
        let err = PipelineError::ModelQuery(ProviderError::ModelAccess("gpt-x".into()));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn ocr_failure_returns_500_with_stage_message() {
        let err = PipelineError::TextExtraction(OcrError::Failed("tesseract exited 1".into()));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "OCR_FAILED");
        assert_eq!(json["error"]["message"], "Could not read text from the image");
    }

    #[tokio::test]
    async fn malformed_extraction_hides_raw_output() {
        let err = PipelineError::JsonRecovery(MalformedExtractionError {
            head: "secret head".into(),
            tail: "secret tail".into(),
            partial_subjects: vec!["ARTE".into()],
        });
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "MALFORMED_EXTRACTION");
        assert!(!json.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("disk full at /tmp".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "An internal error occurred"
        );
    }
}
