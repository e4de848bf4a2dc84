//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::device::WriteError;
use crate::directory::DirectoryError;

/// Message returned when a write targets a device that is down or unknown
pub const PLC_NOT_CONNECTED: &str = "PLC not connected.";

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or rejected credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// The device refused or failed the write
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable (dependency down)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WriteError> for ApiError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::NotConnected => ApiError::NotFound(PLC_NOT_CONNECTED.to_string()),
            WriteError::UnknownTag(tag) => ApiError::NotFound(format!("Node '{}' not found.", tag)),
            WriteError::Coercion(e) => ApiError::Validation(e.to_string()),
            WriteError::Transport(e) => ApiError::WriteFailed(e.to_string()),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::InvalidCredentials | DirectoryError::Inactive => {
                ApiError::Unauthorized(e.to_string())
            }
            other => ApiError::ServiceUnavailable(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::WriteFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "WRITE_FAILED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        };

        let request_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            request_id = %request_id,
            error_code = %code,
            error_message = %self,
            "API error occurred"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CoercionError, TransportError, ValueKind};

    #[test]
    fn test_write_error_mapping() {
        let e: ApiError = WriteError::NotConnected.into();
        assert!(matches!(&e, ApiError::NotFound(m) if m == PLC_NOT_CONNECTED));
        assert_eq!(e.to_string(), "PLC not connected.");

        let e: ApiError = WriteError::UnknownTag("Setpoint".into()).into();
        assert!(matches!(e, ApiError::NotFound(_)));

        let e: ApiError = WriteError::Coercion(CoercionError::TypeMismatch {
            expected: ValueKind::Boolean,
            found: "string",
        })
        .into();
        assert!(matches!(e, ApiError::Validation(_)));

        let e: ApiError = WriteError::Transport(TransportError::Timeout).into();
        assert_eq!(e.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_directory_error_mapping() {
        let e: ApiError = DirectoryError::Inactive.into();
        assert_eq!(e.into_response().status(), StatusCode::UNAUTHORIZED);

        let e: ApiError = DirectoryError::Timeout.into();
        assert_eq!(e.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
