//! Generic endpoints for year-scoped records.
//!
//! One set of handlers serves every versioned kind; the router instantiates them per kind.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::json;

use super::{error, reindex_student, success, written, ApiResult};
use crate::audit;
use crate::auth::{Access, Actor};
use crate::errors::AppError;
use crate::models::{RecordHistory, RecordView, WriteRecordRequest};
use crate::versioning::{ExamScoreKind, StudentRecordKind, VersionedKind};
use crate::AppState;

/// GET .../records - Every stored year of an entity, newest first.
pub async fn get_record_history<K: VersionedKind>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RecordHistory<K::Values>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.records.history::<K>(&id).await {
        Ok(history) => success(history, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET .../records/{year} - The entity's row for one year.
pub async fn get_record_for_year<K: VersionedKind>(
    State(state): State<AppState>,
    Path((id, year)): Path<(String, String)>,
) -> ApiResult<RecordView<K::Values>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let row = state
            .records
            .record_for_year::<K>(&id, &year)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("{} {} has no record for {}", K::NAME, id, year))
            })?;
        state.records.view::<K>(row).await
    }
    .await;

    match result {
        Ok(view) => success(view, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT .../records - Write a partial value set for a year (default: the current one).
pub async fn put_record<K: VersionedKind>(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<WriteRecordRequest>,
) -> ApiResult<RecordView<K::Values>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = write_record::<K>(&state, &actor, &id, &request).await;
    written(&state, revision_id, result).await
}

/// PUT /api/students/{id}/records - As [`put_record`], keeping the directory's school current.
pub async fn put_student_record(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<WriteRecordRequest>,
) -> ApiResult<RecordView<<StudentRecordKind as VersionedKind>::Values>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = write_record::<StudentRecordKind>(&state, &actor, &id, &request).await;
    if result.is_ok() {
        reindex_student(&state, &id).await;
    }
    written(&state, revision_id, result).await
}

/// PUT /api/exam-scores/{id}/records - As [`put_record`], bounding the score by the exam.
pub async fn put_exam_score_record(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<WriteRecordRequest>,
) -> ApiResult<RecordView<<ExamScoreKind as VersionedKind>::Values>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    if let Some(score) = request.values.get("score").and_then(|v| v.as_f64()) {
        match state.repo.exam_for_score(&id).await {
            Ok(Some(exam)) if score > exam.max_score => {
                return error(
                    AppError::Validation(format!(
                        "score must be between 0 and {}",
                        exam.max_score
                    )),
                    revision_id,
                );
            }
            Ok(_) => {}
            Err(e) => return error(e, revision_id),
        }
    }

    let result = write_record::<ExamScoreKind>(&state, &actor, &id, &request).await;
    written(&state, revision_id, result).await
}

async fn write_record<K: VersionedKind>(
    state: &AppState,
    actor: &Actor,
    id: &str,
    request: &WriteRecordRequest,
) -> Result<RecordView<K::Values>, AppError> {
    actor.authorize(Access::Write)?;

    let row = state
        .records
        .write_current_year_value::<K>(id, request.academic_year.as_deref(), &request.values)
        .await?;

    audit::record(
        state.repo.pool(),
        actor.name(),
        "write_record",
        K::TABLE,
        Some(id),
        Some(json!({
            "academicYear": row.academic_year_recorded,
            "isCurrentRecord": row.is_current_record,
            "fields": request.values.keys().collect::<Vec<_>>(),
        })),
    )
    .await;

    state.records.view::<K>(row).await
}
