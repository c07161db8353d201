//! Whole-database maintenance: backup, restore and factory reset.
//!
//! A backup is one JSON document holding every operational table as an array of row objects.
//! Restore and reset each run in a single transaction; the caller refreshes derived state
//! (selected year, search index) afterwards.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqliteConnection, SqlitePool, TypeInfo, ValueRef};

use crate::db::{bump_revision, SCHEMA_VERSION};
use crate::errors::AppError;

/// Format tag written into and required from backup documents.
pub const BACKUP_FORMAT: &str = "sponsorship-backup-v1";

/// Operational tables, parents before children.
const TABLES: [&str; 17] = [
    "academic_years",
    "profiles",
    "sponsors",
    "students",
    "relatives",
    "exams",
    "exam_scores",
    "letters",
    "timeline_events",
    "sponsor_timeline_events",
    "student_records",
    "student_photos",
    "exam_score_records",
    "letter_records",
    "timeline_event_records",
    "audit_logs",
    "settings",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub format: String,
    pub schema_version: i64,
    pub exported_at: String,
    pub tables: BTreeMap<String, Vec<Map<String, Value>>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub tables: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryResetSummary {
    pub preserved_user_id: String,
    pub deleted_rows: u64,
}

/// Export every operational table.
pub async fn backup_all_data(pool: &SqlitePool) -> Result<BackupDocument, AppError> {
    // One read transaction so the snapshot is consistent.
    let mut tx = pool.begin().await?;
    let mut tables = BTreeMap::new();

    for table in TABLES {
        let rows = sqlx::query(&format!("SELECT * FROM {table}"))
            .fetch_all(&mut *tx)
            .await?;
        let rows = rows.iter().map(row_to_json).collect::<Result<Vec<_>, _>>()?;
        tables.insert(table.to_string(), rows);
    }
    tx.commit().await?;

    tracing::info!("Backup exported {} tables", tables.len());

    Ok(BackupDocument {
        format: BACKUP_FORMAT.to_string(),
        schema_version: SCHEMA_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        tables,
    })
}

/// Replace all operational data with the contents of `document`.
pub async fn restore_all_data(
    pool: &SqlitePool,
    document: &BackupDocument,
) -> Result<RestoreSummary, AppError> {
    if document.format != BACKUP_FORMAT {
        return Err(AppError::Validation(format!(
            "Unsupported backup format: {}",
            document.format
        )));
    }
    if document.schema_version > SCHEMA_VERSION {
        return Err(AppError::Validation(format!(
            "Backup schema version {} is newer than {}",
            document.schema_version, SCHEMA_VERSION
        )));
    }

    let mut tx = pool.begin().await?;

    // Validate everything before the first delete.
    for (table, rows) in &document.tables {
        if !TABLES.contains(&table.as_str()) {
            return Err(AppError::Validation(format!("Unknown table: {}", table)));
        }
        let known = table_columns(&mut tx, table).await?;
        for row in rows {
            if let Some(column) = row.keys().find(|c| !known.contains(c.as_str())) {
                return Err(AppError::Validation(format!(
                    "Unknown column {}.{}",
                    table, column
                )));
            }
        }
    }

    sqlx::query("PRAGMA defer_foreign_keys = ON")
        .execute(&mut *tx)
        .await?;
    wipe(&mut tx, None).await?;

    let mut restored = 0;
    for table in TABLES {
        let Some(rows) = document.tables.get(table) else {
            continue;
        };
        for row in rows {
            insert_json_row(&mut tx, table, row).await?;
            restored += 1;
        }
    }

    bump_revision(&mut *tx).await?;
    tx.commit().await?;

    tracing::info!(
        "Restored {} rows across {} tables",
        restored,
        document.tables.len()
    );

    Ok(RestoreSummary {
        tables: document.tables.len(),
        rows: restored,
    })
}

/// Delete all operational data, keeping only the profile `preserve_user_id`.
pub async fn factory_reset_all_data(
    pool: &SqlitePool,
    preserve_user_id: &str,
) -> Result<FactoryResetSummary, AppError> {
    let mut tx = pool.begin().await?;

    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles WHERE id = ?")
        .bind(preserve_user_id)
        .fetch_one(&mut *tx)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound(format!(
            "Profile {} not found",
            preserve_user_id
        )));
    }

    let deleted_rows = wipe(&mut tx, Some(preserve_user_id)).await?;
    bump_revision(&mut *tx).await?;
    tx.commit().await?;

    tracing::warn!(
        "Factory reset removed {} rows, preserved profile {}",
        deleted_rows,
        preserve_user_id
    );

    Ok(FactoryResetSummary {
        preserved_user_id: preserve_user_id.to_string(),
        deleted_rows,
    })
}

/// Delete every operational row, children first.
async fn wipe(conn: &mut SqliteConnection, keep_profile: Option<&str>) -> Result<u64, AppError> {
    let mut deleted = 0;
    for table in TABLES.iter().rev() {
        let result = match (*table, keep_profile) {
            ("profiles", Some(keep)) => {
                sqlx::query("DELETE FROM profiles WHERE id <> ?")
                    .bind(keep)
                    .execute(&mut *conn)
                    .await?
            }
            _ => {
                sqlx::query(&format!("DELETE FROM {table}"))
                    .execute(&mut *conn)
                    .await?
            }
        };
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

async fn table_columns(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<HashSet<String>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
}

async fn insert_json_row(
    conn: &mut SqliteConnection,
    table: &str,
    row: &Map<String, Value>,
) -> Result<(), AppError> {
    let columns: Vec<&str> = row.keys().map(String::as_str).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for (column, value) in row {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b as i64),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                return Err(AppError::Validation(format!(
                    "{}.{} must be a scalar value",
                    table, column
                )))
            }
        };
    }
    query.execute(&mut *conn).await?;
    Ok(())
}

fn row_to_json(row: &SqliteRow) -> Result<Map<String, Value>, AppError> {
    let mut object = Map::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BIGINT" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(index)?),
                "REAL" => Number::from_f64(row.try_get::<f64, _>(index)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                _ => Value::String(row.try_get::<String, _>(index)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}
