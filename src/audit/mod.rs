//! Append-only audit log.
//!
//! Writes are best-effort: a failed audit insert is logged and never fails the operation that
//! triggered it.

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::AuditLogEntry;

/// Record one audit entry.
pub async fn record(
    pool: &SqlitePool,
    actor: &str,
    action: &str,
    entity: &str,
    entity_id: Option<&str>,
    details: Option<Value>,
) {
    let details = details.map(|d| d.to_string());
    let result = sqlx::query(
        "INSERT INTO audit_logs (id, actor, action, entity, entity_id, details, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(actor)
    .bind(action)
    .bind(entity)
    .bind(entity_id)
    .bind(details)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to write audit entry {} {}: {}", action, entity, e);
    }
}

/// Newest entries first, optionally for one entity type.
pub async fn list(
    pool: &SqlitePool,
    entity: Option<&str>,
    limit: i64,
) -> Result<Vec<AuditLogEntry>, AppError> {
    let limit = limit.clamp(1, 1000);
    let rows = match entity {
        Some(entity) => {
            sqlx::query(
                "SELECT id, actor, action, entity, entity_id, details, created_at FROM audit_logs WHERE entity = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(entity)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT id, actor, action, entity, entity_id, details, created_at FROM audit_logs ORDER BY created_at DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.iter().map(entry_from_row).collect())
}

fn entry_from_row(row: &SqliteRow) -> AuditLogEntry {
    let details: Option<String> = row.get("details");
    AuditLogEntry {
        id: row.get("id"),
        actor: row.get("actor"),
        action: row.get("action"),
        entity: row.get("entity"),
        entity_id: row.get("entity_id"),
        details: details.and_then(|d| serde_json::from_str(&d).ok()),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_and_filter() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();

        record(&pool, "service", "create", "sponsor", Some("sp1"), None).await;
        record(
            &pool,
            "service",
            "switch",
            "academic_year",
            Some("y1"),
            Some(json!({ "yearName": "2024" })),
        )
        .await;

        assert_eq!(list(&pool, None, 100).await.unwrap().len(), 2);
        let years = list(&pool, Some("academic_year"), 100).await.unwrap();
        assert_eq!(years.len(), 1);
        assert_eq!(years[0].details, Some(json!({ "yearName": "2024" })));
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        pool.close().await;

        // Must not panic or return an error.
        record(&pool, "service", "create", "sponsor", None, None).await;
    }
}
