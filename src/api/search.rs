//! Directory search endpoint and index maintenance helpers.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{error, success, ApiResult};
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::Sponsor;
use crate::search::{DirectoryEntry, EntryKind, SearchHit, SearchIndex};
use crate::versioning::StudentRecordKind;
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string.
    pub q: String,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// Search hits with paging metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

/// GET /api/search - Search students and sponsors.
pub async fn search_directory(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let limit = params.limit.min(MAX_SEARCH_LIMIT);

    match state.search.search(&params.q, limit, params.offset) {
        Ok(results) => success(
            SearchResponse {
                total: results.len(),
                results,
                limit,
                offset: params.offset,
            },
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// Rebuild the directory index from the database.
pub async fn rebuild_directory(repo: &Repository, search: &SearchIndex) -> Result<usize, AppError> {
    let mut entries: Vec<DirectoryEntry> = repo
        .list_students(None)
        .await?
        .iter()
        .map(|s| {
            DirectoryEntry::student(&s.student, s.current_record.as_ref().map(|r| &r.values))
        })
        .collect();
    entries.extend(repo.list_sponsors().await?.iter().map(DirectoryEntry::sponsor));

    search.rebuild(&entries).await?;
    Ok(entries.len())
}

/// Re-index one student after a write. Failures are logged and ignored.
pub(crate) async fn reindex_student(state: &AppState, student_id: &str) {
    let result = async {
        let Some(student) = state.repo.get_student(student_id).await? else {
            return Ok::<(), AppError>(());
        };
        let record = state
            .records
            .current_record::<StudentRecordKind>(student_id)
            .await?;
        let entry = DirectoryEntry::student(&student, record.as_ref().map(|r| &r.values));
        state.search.index_entry(&entry).await
    }
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to index student {}: {}", student_id, e);
    }
}

/// Re-index one sponsor after a write. Failures are logged and ignored.
pub(crate) async fn reindex_sponsor(state: &AppState, sponsor: &Sponsor) {
    if let Err(e) = state.search.index_entry(&DirectoryEntry::sponsor(sponsor)).await {
        tracing::warn!("Failed to index sponsor {}: {}", sponsor.id, e);
    }
}

/// Drop a deleted entity from the index. Failures are logged and ignored.
pub(crate) async fn unindex(state: &AppState, kind: EntryKind, id: &str) {
    if let Err(e) = state.search.remove_entry(kind, id).await {
        tracing::warn!("Failed to remove {} {} from index: {}", kind.as_str(), id, e);
    }
}
