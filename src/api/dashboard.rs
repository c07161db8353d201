//! Dashboard endpoint.

use axum::extract::State;

use super::{error, success, ApiResult};
use crate::models::DashboardSummary;
use crate::AppState;

/// GET /api/dashboard - Counts for the current academic year.
pub async fn get_dashboard(State(state): State<AppState>) -> ApiResult<DashboardSummary> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.dashboard().await {
        Ok(summary) => success(summary, revision_id),
        Err(e) => error(e, revision_id),
    }
}
