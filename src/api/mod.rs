//! REST API module.
//!
//! Every handler answers with the success or error envelope and the revision the client
//! should cache against. Writes report the revision produced by the write.

mod academic_years;
mod audit;
mod dashboard;
mod exams;
mod maintenance;
mod profiles;
mod records;
mod revision;
mod search;
mod settings;
mod sponsors;
mod students;

pub use academic_years::*;
pub use audit::*;
pub use dashboard::*;
pub use exams::*;
pub use maintenance::*;
pub use profiles::*;
pub use records::*;
pub use revision::*;
pub use search::*;
pub use settings::*;
pub use sponsors::*;
pub use students::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(crate::errors::AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Answer a write: on success with the revision it produced, on failure with the one before.
pub async fn written<T: Serialize>(
    state: &AppState,
    revision_id: i64,
    result: Result<T, AppError>,
) -> ApiResult<T> {
    match result {
        Ok(data) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(data, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// Reject blank required text fields before any write.
pub fn require_text(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
