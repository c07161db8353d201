//! Academic year API endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::json;

use super::{error, require_text, success, written, ApiResult};
use crate::audit;
use crate::auth::{Access, Actor};
use crate::errors::AppError;
use crate::models::{
    AcademicYear, CreateAcademicYearRequest, CrossYearWarning, CrossYearWarningQuery,
    UpdateAcademicYearRequest,
};
use crate::years::cross_year_warning;
use crate::AppState;

/// GET /api/academic-years - List all years, newest first.
pub async fn list_academic_years(
    State(state): State<AppState>,
) -> ApiResult<Vec<AcademicYear>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.years.list_years().await {
        Ok(years) => success(years, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/academic-years/current - The current year, or null when none exist.
pub async fn get_current_academic_year(
    State(state): State<AppState>,
) -> ApiResult<Option<AcademicYear>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.years.current_year().await {
        Ok(year) => success(year, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/academic-years/warning?recordYear= - Cross-year advisory for a record year.
pub async fn get_cross_year_warning(
    State(state): State<AppState>,
    Query(query): Query<CrossYearWarningQuery>,
) -> ApiResult<CrossYearWarning> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.years.current_year().await {
        Ok(selected) => success(
            CrossYearWarning {
                warning: cross_year_warning(query.record_year.as_deref(), selected.as_ref()),
            },
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/academic-years - Create a year.
pub async fn create_academic_year(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateAcademicYearRequest>,
) -> ApiResult<AcademicYear> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor
        .authorize(Access::Admin)
        .and_then(|_| require_text(&request.year_name, "yearName"))
    {
        return error(e, revision_id);
    }

    let result = state.years.create_year(&request).await;
    if let Ok(year) = &result {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "academic_year",
            Some(&year.id),
            Some(json!({ "yearName": year.year_name, "isCurrent": request.is_current })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// PUT /api/academic-years/{id} - Rename or re-date a year.
pub async fn update_academic_year(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<UpdateAcademicYearRequest>,
) -> ApiResult<AcademicYear> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }
    if let Some(name) = &request.year_name {
        if let Err(e) = require_text(name, "yearName") {
            return error(e, revision_id);
        }
    }

    let result = state.years.update_year(&id, &request).await;
    if result.is_ok() {
        audit::record(state.repo.pool(), actor.name(), "update", "academic_year", Some(&id), None)
            .await;
    }
    written(&state, revision_id, result).await
}

/// POST /api/academic-years/{id}/set-current - Switch the current year.
pub async fn set_current_academic_year(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<AcademicYear> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }

    let result = state.years.set_current_year(&id).await;
    match &result {
        Ok(year) => {
            audit::record(
                state.repo.pool(),
                actor.name(),
                "set_current",
                "academic_year",
                Some(&year.id),
                Some(json!({ "yearName": year.year_name })),
            )
            .await
        }
        Err(AppError::NotFound(_)) => {}
        Err(e) => tracing::warn!("Failed to switch academic year to {}: {}", id, e),
    }
    written(&state, revision_id, result).await
}
