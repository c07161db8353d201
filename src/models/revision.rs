//! Revision model used by clients to detect stale cached views.

use serde::{Deserialize, Serialize};

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
