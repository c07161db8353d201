//! Exam and score API endpoints.

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
    CreateExamRequest, CreateScoreRequest, Exam, ExamListQuery, ScoreView, UpdateExamRequest,
};
use crate::AppState;

/// GET /api/exams - List exams, optionally for one academic year.
pub async fn list_exams(
    State(state): State<AppState>,
    Query(query): Query<ExamListQuery>,
) -> ApiResult<Vec<Exam>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_exams(query.academic_year.as_deref()).await {
        Ok(exams) => success(exams, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/exams/{id}
pub async fn get_exam(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Exam> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_exam(&id).await {
        Ok(Some(exam)) => success(exam, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Exam {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/exams
pub async fn create_exam(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateExamRequest>,
) -> ApiResult<Exam> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor
        .authorize(Access::Write)
        .and_then(|_| require_text(&request.name, "name"))
    {
        return error(e, revision_id);
    }

    let result = state.repo.create_exam(&request).await;
    if let Ok(exam) = &result {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "exam",
            Some(&exam.id),
            Some(json!({ "name": exam.name, "academicYear": exam.academic_year })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// PUT /api/exams/{id}
pub async fn update_exam(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<UpdateExamRequest>,
) -> ApiResult<Exam> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }
    if let Some(name) = &request.name {
        if let Err(e) = require_text(name, "name") {
            return error(e, revision_id);
        }
    }

    let result = state.repo.update_exam(&id, &request).await;
    if result.is_ok() {
        audit::record(state.repo.pool(), actor.name(), "update", "exam", Some(&id), None).await;
    }
    written(&state, revision_id, result).await
}

/// DELETE /api/exams/{id}
pub async fn delete_exam(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.delete_exam(&id).await;
    if result.is_ok() {
        audit::record(state.repo.pool(), actor.name(), "delete", "exam", Some(&id), None).await;
    }
    written(&state, revision_id, result).await
}

/// GET /api/exams/{id}/scores - Current scores with percentages.
pub async fn list_exam_scores(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ScoreView>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_scores(&id).await {
        Ok(scores) => success(scores, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/exams/{id}/scores - Record a student's score.
pub async fn create_exam_score(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<CreateScoreRequest>,
) -> ApiResult<ScoreView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.create_score(&id, &request).await;
    if let Ok(score) = &result {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "exam_score",
            Some(&score.score_id),
            Some(json!({ "examId": id, "studentId": request.student_id })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}
