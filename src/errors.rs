use crate::services::storage_service::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An HTTP-facing error rendered in the storage service's JSON error shape.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub reason: &'static str,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, reason: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            reason,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internalError", msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid", msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "notFound", msg)
    }

    /// Shortcut for 409 Conflict
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.status.as_u16(),
                "message": self.message,
                "errors": [{
                    "message": self.message,
                    "reason": self.reason,
                }],
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BadRequest(_)
            | StorageError::PathTraversal
            | StorageError::MalformedRequest(_) => AppError::bad_request(err.to_string()),
            StorageError::BucketAlreadyExists(_) => AppError::conflict(err.to_string()),
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            StorageError::Io(io_err) => {
                tracing::error!("storage I/O failure: {}", io_err);
                AppError::internal("internal error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::multipart::MultipartError;

    #[test]
    fn test_storage_errors_map_to_status_codes() {
        let cases = [
            (StorageError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (StorageError::PathTraversal, StatusCode::BAD_REQUEST),
            (
                StorageError::MalformedRequest(MultipartError::MissingBoundary),
                StatusCode::BAD_REQUEST,
            ),
            (
                StorageError::BucketAlreadyExists("b".into()),
                StatusCode::CONFLICT,
            ),
            (
                StorageError::BucketNotFound("b".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                StorageError::ObjectNotFound {
                    bucket: "b".into(),
                    key: "k".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                StorageError::Io(std::io::Error::other("disk on fire")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn test_io_errors_do_not_leak_details() {
        let err = AppError::from(StorageError::Io(std::io::Error::other("/secret/path")));
        assert_eq!(err.message, "internal error");
    }
}
