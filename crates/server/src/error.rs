//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use depot_storage::StorageError;
use depot_uploads::UploadError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Upload(e) => e.kind(),
            Self::Storage(_) => "storage_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upload(e) => match e {
                UploadError::InvalidSize { .. } | UploadError::InvalidRange(_) => {
                    StatusCode::BAD_REQUEST
                }
                UploadError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                UploadError::RangeConflict { .. } | UploadError::CommitInProgress(_) => {
                    StatusCode::CONFLICT
                }
                UploadError::ChunkIntegrityError { .. }
                | UploadError::IncompleteUpload { .. }
                | UploadError::DigestMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                UploadError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
                UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
