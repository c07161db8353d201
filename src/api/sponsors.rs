//! Sponsor API endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::json;

use super::{error, reindex_sponsor, require_text, success, unindex, written, ApiResult};
use crate::audit;
use crate::auth::{Access, Actor};
use crate::errors::AppError;
use crate::models::{
    CreateSponsorRequest, CreateSponsorTimelineEventRequest, Sponsor, SponsorTimelineEvent,
    StudentWithRecord, UpdateSponsorRequest,
};
use crate::search::EntryKind;
use crate::AppState;

/// GET /api/sponsors - List all sponsors.
pub async fn list_sponsors(State(state): State<AppState>) -> ApiResult<Vec<Sponsor>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_sponsors().await {
        Ok(sponsors) => success(sponsors, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/sponsors/{id} - Get a single sponsor.
pub async fn get_sponsor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Sponsor> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_sponsor(&id).await {
        Ok(Some(sponsor)) => success(sponsor, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Sponsor {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/sponsors - Create a sponsor.
pub async fn create_sponsor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateSponsorRequest>,
) -> ApiResult<Sponsor> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.create_sponsor(&request).await;
    if let Ok(sponsor) = &result {
        reindex_sponsor(&state, sponsor).await;
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "sponsor",
            Some(&sponsor.id),
            Some(json!({ "name": sponsor.display_name() })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// PUT /api/sponsors/{id} - Update a sponsor, honoring `expectedVersion`.
pub async fn update_sponsor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<UpdateSponsorRequest>,
) -> ApiResult<Sponsor> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.update_sponsor(&id, &request).await;
    if let Ok(sponsor) = &result {
        reindex_sponsor(&state, sponsor).await;
        audit::record(
            state.repo.pool(),
            actor.name(),
            "update",
            "sponsor",
            Some(&id),
            Some(json!({ "version": sponsor.version, "updateEmail": sponsor.update_email() })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// DELETE /api/sponsors/{id} - Delete a sponsor; its students lose the link but survive.
pub async fn delete_sponsor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Write) {
        return error(e, revision_id);
    }

    let result = state.repo.delete_sponsor(&id).await;
    if result.is_ok() {
        unindex(&state, EntryKind::Sponsor, &id).await;
        audit::record(state.repo.pool(), actor.name(), "delete", "sponsor", Some(&id), None).await;
    }
    written(&state, revision_id, result).await
}

/// GET /api/sponsors/{id}/students - Students currently sponsored.
pub async fn list_sponsor_students(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<StudentWithRecord>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_sponsor(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error(
                AppError::NotFound(format!("Sponsor {} not found", id)),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    }

    match state.repo.list_students(Some(&id)).await {
        Ok(students) => success(students, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/sponsors/{id}/timeline - Sponsor timeline, newest first.
pub async fn list_sponsor_timeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<SponsorTimelineEvent>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_sponsor_timeline(&id).await {
        Ok(events) => success(events, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/sponsors/{id}/timeline - Append a timeline entry.
pub async fn create_sponsor_timeline_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<CreateSponsorTimelineEventRequest>,
) -> ApiResult<SponsorTimelineEvent> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor
        .authorize(Access::Write)
        .and_then(|_| require_text(&request.title, "title"))
    {
        return error(e, revision_id);
    }

    let result = state.repo.create_sponsor_timeline_event(&id, &request).await;
    if let Ok(event) = &result {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "sponsor_timeline_event",
            Some(&event.id),
            Some(json!({ "sponsorId": id, "eventType": event.event_type })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}
