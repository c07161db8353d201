//! Student API endpoints: identity, sponsorship link, relatives, timeline and letters.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::json;

use super::{error, reindex_student, require_text, success, unindex, written, ApiResult};
use crate::audit;
use crate::auth::{Access, Actor};
use crate::errors::AppError;
use crate::models::{
    AssignSponsorRequest, CreateLetterRequest, CreateRelativeRequest, CreateStudentRequest,
    CreateTimelineEventRequest, LetterView, Relative, Student, StudentListQuery,
    StudentWithRecord, TimelineEventView, UpdateStudentRequest,
};
use crate::search::EntryKind;
use crate::versioning::StudentRecordKind;
use crate::AppState;

/// GET /api/students - List students with their current records.
pub async fn list_students(
    State(state): State<AppState>,
    Query(query): Query<StudentListQuery>,
) -> ApiResult<Vec<StudentWithRecord>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_students(query.sponsor_id.as_deref()).await {
        Ok(students) => success(students, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/students/{id} - Get a student with its current record.
pub async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StudentWithRecord> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let student = match state.repo.get_student(&id).await {
        Ok(Some(student)) => student,
        Ok(None) => {
            return error(
                AppError::NotFound(format!("Student {} not found", id)),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    };

    match state.records.current_record::<StudentRecordKind>(&id).await {
        Ok(current_record) => success(
            StudentWithRecord {
                student,
                current_record,
            },
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/students - Create a student and its current-year record.
pub async fn create_student(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateStudentRequest>,
) -> ApiResult<StudentWithRecord> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor
        .authorize(Access::Write)
        .and_then(|_| require_text(&request.first_name, "firstName"))
        .and_then(|_| require_text(&request.last_name, "lastName"))
    {
        return error(e, revision_id);
    }

    let result = state.repo.create_student(&request).await;
    if let Ok(created) = &result {
        reindex_student(&state, &created.student.id).await;
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "student",
            Some(&created.student.id),
            Some(json!({ "name": created.student.display_name() })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// PUT /api/students/{id} - Update identity fields.
pub async fn update_student(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStudentRequest>,
) -> ApiResult<Student> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.update_student(&id, &request).await;
    if result.is_ok() {
        reindex_student(&state, &id).await;
        audit::record(state.repo.pool(), actor.name(), "update", "student", Some(&id), None).await;
    }
    written(&state, revision_id, result).await
}

/// DELETE /api/students/{id} - Delete a student and everything anchored to it.
pub async fn delete_student(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.delete_student(&id).await;
    if result.is_ok() {
        unindex(&state, EntryKind::Student, &id).await;
        audit::record(state.repo.pool(), actor.name(), "delete", "student", Some(&id), None).await;
    }
    written(&state, revision_id, result).await
}

/// PUT /api/students/{id}/sponsor - Link the student to a sponsor.
pub async fn assign_sponsor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<AssignSponsorRequest>,
) -> ApiResult<Student> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.assign_sponsor(&id, &request).await;
    if let Ok(student) = &result {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "assign_sponsor",
            "student",
            Some(&id),
            Some(json!({
                "sponsorId": student.sponsor_id,
                "sponsoredSince": student.sponsored_since,
            })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// DELETE /api/students/{id}/sponsor - Remove the sponsorship link.
pub async fn unassign_sponsor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Student> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.unassign_sponsor(&id).await;
    if result.is_ok() {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "unassign_sponsor",
            "student",
            Some(&id),
            None,
        )
        .await;
    }
    written(&state, revision_id, result).await
}

// ==================== RELATIVES ====================

/// GET /api/students/{id}/relatives
pub async fn list_relatives(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Relative>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_relatives(&id).await {
        Ok(relatives) => success(relatives, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/students/{id}/relatives
pub async fn create_relative(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<CreateRelativeRequest>,
) -> ApiResult<Relative> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor
        .authorize(Access::Write)
        .and_then(|_| require_text(&request.name, "name"))
    {
        return error(e, revision_id);
    }

    let result = state.repo.create_relative(&id, &request).await;
    if let Ok(relative) = &result {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "relative",
            Some(&relative.id),
            Some(json!({ "studentId": id })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// DELETE /api/relatives/{id}
pub async fn delete_relative(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.delete_relative(&id).await;
    if result.is_ok() {
        audit::record(state.repo.pool(), actor.name(), "delete", "relative", Some(&id), None)
            .await;
    }
    written(&state, revision_id, result).await
}

// ==================== TIMELINE ====================

/// GET /api/students/{id}/timeline
pub async fn list_student_timeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<TimelineEventView>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_timeline_events(&id).await {
        Ok(events) => success(events, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/students/{id}/timeline
pub async fn create_student_timeline_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<CreateTimelineEventRequest>,
) -> ApiResult<TimelineEventView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.create_timeline_event(&id, &request).await;
    if let Ok(event) = &result {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "timeline_event",
            Some(&event.id),
            Some(json!({ "studentId": id })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

// ==================== LETTERS ====================

/// GET /api/students/{id}/letters
pub async fn list_letters(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<LetterView>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_letters(&id).await {
        Ok(letters) => success(letters, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/students/{id}/letters
pub async fn create_letter(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<CreateLetterRequest>,
) -> ApiResult<LetterView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.create_letter(&id, &request).await;
    if let Ok(letter) = &result {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "letter",
            Some(&letter.id),
            Some(json!({ "studentId": id, "sponsorId": letter.sponsor_id })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}
