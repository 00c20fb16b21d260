use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parkline_core::ParkError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    UnavailableError(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnavailableError(msg) => {
                tracing::warn!("Collaborator unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<ParkError> for AppError {
    fn from(err: ParkError) -> Self {
        match err {
            ParkError::NotFound(what) => AppError::NotFoundError(format!("{} not found", what)),
            ParkError::PreconditionFailed(msg) => AppError::ConflictError(msg),
            ParkError::CollaboratorUnavailable(msg) => AppError::UnavailableError(msg),
            other @ (ParkError::InvalidInterval { .. } | ParkError::Store(_)) => {
                AppError::InternalServerError(other.to_string())
            }
        }
    }
}
