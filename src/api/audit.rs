//! Audit log endpoint.

use axum::{
    extract::{Query, State},
    Extension,
};

use super::{error, success, ApiResult};
use crate::audit;
use crate::auth::{Access, Actor};
use crate::models::{AuditLogEntry, AuditLogQuery};
use crate::AppState;

/// GET /api/audit-logs - Newest entries first, optionally for one entity type.
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<AuditLogQuery>,
) -> ApiResult<Vec<AuditLogEntry>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }

    match audit::list(state.repo.pool(), query.entity.as_deref(), query.limit).await {
        Ok(entries) => success(entries, revision_id),
        Err(e) => error(e, revision_id),
    }
}
