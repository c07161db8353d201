//! Maintenance endpoints: backup, restore and factory reset (admin only).

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::json;

use super::{error, rebuild_directory, success, written, ApiResult};
use crate::audit;
use crate::auth::{Access, Actor};
use crate::maintenance::{
    backup_all_data, factory_reset_all_data, restore_all_data, BackupDocument,
    FactoryResetSummary, RestoreSummary,
};
use crate::AppState;

/// Request body for a factory reset.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryResetRequest {
    /// Profile that survives the reset
    pub preserve_user_id: String,
}

/// POST /api/maintenance/backup - Export every operational table.
pub async fn backup(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<BackupDocument> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }

    match backup_all_data(state.repo.pool()).await {
        Ok(document) => {
            let rows: usize = document.tables.values().map(Vec::len).sum();
            audit::record(
                state.repo.pool(),
                actor.name(),
                "backup",
                "maintenance",
                None,
                Some(json!({ "rows": rows })),
            )
            .await;
            success(document, revision_id)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/maintenance/restore - Replace all data with a backup document.
pub async fn restore(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(document): Json<BackupDocument>,
) -> ApiResult<RestoreSummary> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }

    let result = restore_all_data(state.repo.pool(), &document).await;
    if let Ok(summary) = &result {
        refresh_derived_state(&state).await;
        audit::record(
            state.repo.pool(),
            actor.name(),
            "restore",
            "maintenance",
            None,
            Some(json!({ "tables": summary.tables, "rows": summary.rows })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// POST /api/maintenance/factory-reset - Delete all data except one profile.
pub async fn factory_reset(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<FactoryResetRequest>,
) -> ApiResult<FactoryResetSummary> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }

    let result = factory_reset_all_data(state.repo.pool(), &request.preserve_user_id).await;
    if let Ok(summary) = &result {
        refresh_derived_state(&state).await;
        audit::record(
            state.repo.pool(),
            actor.name(),
            "factory_reset",
            "maintenance",
            Some(&summary.preserved_user_id),
            Some(json!({ "deletedRows": summary.deleted_rows })),
        )
        .await;
    }
    written(&state, revision_id, result).await
}

/// Re-read the current year and rebuild the directory after data was replaced wholesale.
async fn refresh_derived_state(state: &AppState) {
    if let Err(e) = state.years.refresh().await {
        tracing::warn!("Failed to reload current academic year: {}", e);
    }
    if let Err(e) = rebuild_directory(&state.repo, &state.search).await {
        tracing::warn!("Failed to rebuild search index: {}", e);
    }
}
