use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::similarity::error::ScoringError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Scoring(ScoringError::EmptyInput) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Text cannot be empty".to_string(),
            ),
            AppError::Scoring(e @ ScoringError::DimensionMismatch { .. })
            | AppError::Scoring(e @ ScoringError::DegenerateVector) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                e.to_string(),
            ),
            AppError::Scoring(ScoringError::ModelUnavailable(msg)) => {
                tracing::error!("Embedding model unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "MODEL_UNAVAILABLE",
                    "The embedding model is not available".to_string(),
                )
            }
            AppError::Scoring(ScoringError::Inference(msg)) => {
                tracing::error!("Embedding inference error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INFERENCE_ERROR",
                    "An embedding error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_maps_to_bad_request() {
        let (status, code, _) = AppError::from(ScoringError::EmptyInput).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_model_unavailable_maps_to_503() {
        let err = AppError::from(ScoringError::ModelUnavailable("no network".to_string()));
        let (status, code, message) = err.parts();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code, "MODEL_UNAVAILABLE");
        assert!(!message.contains("no network"));
    }

    #[test]
    fn test_vector_errors_map_to_422() {
        let mismatch = AppError::from(ScoringError::DimensionMismatch { left: 384, right: 768 });
        assert_eq!(mismatch.parts().0, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(mismatch.parts().2.contains("384"));

        let degenerate = AppError::from(ScoringError::DegenerateVector);
        assert_eq!(degenerate.parts().0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_inference_error_hides_detail() {
        let err = AppError::from(ScoringError::Inference("shape mismatch".to_string()));
        let (status, _, message) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("shape"));
    }
}
