//! Error handling module for the sponsorship backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const CONFLICT: &str = "CONFLICT";
    pub const VERSION_MISMATCH: &str = "VERSION_MISMATCH";
    pub const TRANSIENT_IO: &str = "TRANSIENT_IO";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const SEARCH_ERROR: &str = "SEARCH_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// SQLite result code for a locked database (`SQLITE_BUSY`).
const SQLITE_BUSY: &str = "5";
/// Extended code for a read snapshot made stale by another writer's commit (`SQLITE_BUSY_SNAPSHOT`).
const SQLITE_BUSY_SNAPSHOT: &str = "517";

/// Whether a failed write lost a race with another writer: a uniqueness violation, or a lock
/// conflict raised when a transaction that already read tries to start writing.
pub fn is_write_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                || matches!(
                    db_err.code().as_deref(),
                    Some(SQLITE_BUSY) | Some(SQLITE_BUSY_SNAPSHOT)
                )
        }
        _ => false,
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Authentication required
    Unauthorized(String),
    /// Authorization policy rejected the operation
    PermissionDenied(String),
    /// Resource not found
    NotFound(String),
    /// Validation error, raised before any write is attempted
    Validation(String),
    /// Uniqueness violation (e.g. two writers creating the same year's record)
    Conflict(String),
    /// Optimistic concurrency conflict
    VersionMismatch {
        message: String,
        current_version: i64,
    },
    /// Network or storage failure worth a manual retry
    Transient(String),
    /// Database error
    Database(String),
    /// Search index error
    Search(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::VersionMismatch { .. } => StatusCode::CONFLICT,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Search(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::PermissionDenied(_) => codes::PERMISSION_DENIED,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::Conflict(_) => codes::CONFLICT,
            AppError::VersionMismatch { .. } => codes::VERSION_MISMATCH,
            AppError::Transient(_) => codes::TRANSIENT_IO,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Search(_) => codes::SEARCH_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg)
            | AppError::PermissionDenied(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Transient(msg)
            | AppError::Database(msg)
            | AppError::Search(msg)
            | AppError::Internal(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::VersionMismatch { message, .. } => message.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                tracing::debug!("Uniqueness violation: {:?}", err);
                AppError::Conflict(format!("Record already exists: {}", db_err.message()))
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::Validation(format!("Referenced record does not exist: {}", db_err.message()))
            }
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(SQLITE_BUSY_SNAPSHOT) =>
            {
                tracing::debug!("Stale read snapshot: {:?}", err);
                AppError::Conflict("Data changed while the request was running; retry".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(SQLITE_BUSY) => {
                tracing::warn!("Database busy: {:?}", err);
                AppError::Transient("Database is busy, please retry".to_string())
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_) => {
                tracing::error!("Database unavailable: {:?}", err);
                AppError::Transient(format!("Database unavailable: {}", err))
            }
            _ => {
                tracing::error!("Database error: {:?}", err);
                AppError::Database(format!("Database error: {}", err))
            }
        }
    }
}

impl From<tantivy::TantivyError> for AppError {
    fn from(err: tantivy::TantivyError) -> Self {
        tracing::error!("Search error: {:?}", err);
        AppError::Search(format!("Search error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::warn!("Outbound HTTP error: {:?}", err);
        AppError::Transient(format!("Outbound request failed: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
    pub revision_id: i64,
}

impl ErrorResponse {
    pub fn new(error: &AppError, revision_id: i64) -> Self {
        let details = match error {
            AppError::VersionMismatch {
                current_version, ..
            } => Some(serde_json::json!({ "currentVersion": current_version })),
            _ => None,
        };

        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
                details,
            },
            revision_id,
        }
    }
}

/// Wrapper type for errors that carry revision_id context.
pub struct AppErrorWithRevision {
    pub error: AppError,
    pub revision_id: i64,
}

impl IntoResponse for AppErrorWithRevision {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = ErrorResponse::new(&self.error, self.revision_id);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::PermissionDenied("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Transient("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Validation("x".into()).error_code(),
            codes::VALIDATION_ERROR
        );
    }

    #[test]
    fn test_version_mismatch_carries_details() {
        let err = AppError::VersionMismatch {
            message: "stale".into(),
            current_version: 4,
        };
        let body = ErrorResponse::new(&err, 9);
        assert!(!body.success);
        assert_eq!(body.error.code, codes::VERSION_MISMATCH);
        assert_eq!(body.error.details.unwrap()["currentVersion"], 4);
        assert_eq!(body.revision_id, 9);
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.error_code(), codes::TRANSIENT_IO);
    }
}
