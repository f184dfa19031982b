//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::ingest::{FileMoveError, IngestError};
use crate::service::ServiceError;
use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Resource errors
    NotFound(String),
    AlreadyExists(String),

    // Validation errors
    ValidationError(String),

    // Database errors
    DatabaseError(String),

    // Generic errors
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg.as_str()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred")
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::AlreadyExists(msg),
            StoreError::Rejected(msg) => AppError::ValidationError(msg),
            StoreError::Database(msg) => AppError::DatabaseError(msg),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            ServiceError::Validation(msg) => AppError::ValidationError(msg),
            ServiceError::Conflict(msg) => AppError::AlreadyExists(msg),
            ServiceError::Store(e) => e.into(),
            ServiceError::Ingest(e @ IngestError::FileNotFound(_)) => AppError::NotFound(e.to_string()),
            ServiceError::Ingest(e) => AppError::InternalError(e.to_string()),
            ServiceError::File(e @ FileMoveError::InvalidName(_)) => AppError::ValidationError(e.to_string()),
            ServiceError::File(e) => AppError::InternalError(e.to_string()),
            ServiceError::Internal(msg) => AppError::InternalError(msg),
        }
    }
}
