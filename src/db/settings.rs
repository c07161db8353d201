//! Organization settings operations.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{bump_revision, Repository};
use crate::errors::AppError;
use crate::models::Setting;

impl Repository {
    /// List all settings entries.
    pub async fn list_settings(&self) -> Result<Vec<Setting>, AppError> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(setting_from_row).collect()
    }

    /// Get one settings value.
    pub async fn get_setting(&self, key: &str) -> Result<Option<Setting>, AppError> {
        let row = sqlx::query("SELECT key, value, updated_at FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(setting_from_row).transpose()
    }

    /// Insert or replace a settings value.
    pub async fn put_setting(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<Setting, AppError> {
        let now = Utc::now().to_rfc3339();
        let encoded = serde_json::to_string(value)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(&encoded)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(Setting {
            key: key.to_string(),
            value: value.clone(),
            updated_at: now,
        })
    }
}

fn setting_from_row(row: &SqliteRow) -> Result<Setting, AppError> {
    let value: String = row.get("value");
    Ok(Setting {
        key: row.get("key"),
        value: serde_json::from_str(&value)?,
        updated_at: row.get("updated_at"),
    })
}
