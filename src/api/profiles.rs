//! Profile and role management endpoints (admin only).

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::json;

use super::{error, success, written, ApiResult};
use crate::audit;
use crate::auth::{Access, Actor};
use crate::errors::AppError;
use crate::models::{CreateProfileRequest, Profile, UpdateRoleRequest};
use crate::AppState;

/// GET /api/profiles
pub async fn list_profiles(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<Profile>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }

    match state.repo.list_profiles().await {
        Ok(profiles) => success(profiles, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/profiles
pub async fn create_profile(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateProfileRequest>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }
    if !request.email.contains('@') {
        return error(
            AppError::Validation("email must be a valid address".to_string()),
            revision_id,
        );
    }

    let result = state.repo.create_profile(&request).await;
    if let Ok(profile) = &result {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "create",
            "profile",
            Some(&profile.id),
            Some(json!({ "role": profile.role.as_str() })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// PUT /api/profiles/{id}/role
pub async fn update_profile_role(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<UpdateRoleRequest>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }

    let result = state.repo.update_profile_role(&id, request.role).await;
    if result.is_ok() {
        audit::record(
            state.repo.pool(),
            actor.name(),
            "update_role",
            "profile",
            Some(&id),
            Some(json!({ "role": request.role.as_str() })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}
