use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::pipeline::{BatchError, FaceError, PipelineError};

/// Request-level error taxonomy. Validation and detection failures are
/// caller-fixable (400); prediction and internal faults are 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Detection(String),
    #[error("Prediction failed")]
    Prediction(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Detection(_) => StatusCode::BAD_REQUEST,
            ApiError::Prediction(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            // Detection failures also carry the face count.
            ApiError::Detection(msg) => json!({ "error": msg, "detected_faces": 0 }),
            other => json!({ "error": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            // Undecodable bytes map to 500, not 400.
            PipelineError::Decode(e) => ApiError::Internal(e.to_string()),
            PipelineError::Face(FaceError::Unavailable) => {
                ApiError::Internal(FaceError::Unavailable.to_string())
            }
            PipelineError::Face(e) => ApiError::Detection(e.to_string()),
            PipelineError::Classify(e) => ApiError::Prediction(e.to_string()),
            PipelineError::Encode(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        ApiError::Validation(err.to_string())
    }
}
