//! Year-scoped versioned records.
//!
//! Several entities keep one stored row per academic year: the current-year row is flagged
//! `is_current_record`, earlier rows are history. [`VersionedKind`] describes where a kind is
//! stored; [`VersionStore`] owns the promotion/demotion rules for every kind, so no table carries
//! its own copy of them.
//!
//! After any successful write each entity has exactly one row flagged current. The partial
//! unique index created in `db` guarantees "at most one"; the writer guarantees "at least one".

mod kinds;

pub use kinds::*;

use std::fmt::Debug;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use crate::db::bump_revision;
use crate::errors::{is_write_contention, AppError};
use crate::models::{AcademicYear, RecordHistory, RecordView, VersionedRow};
use crate::years::{cross_year_warning, select_current_year, AcademicYearAuthority};

/// A column value bound into a versioned-table statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Real(Option<f64>),
    Int(Option<i64>),
}

/// Storage description of one versioned kind.
pub trait VersionedKind: Send + Sync + 'static {
    /// Human-readable name used in messages and audit entries.
    const NAME: &'static str;
    /// Table holding the year-scoped rows.
    const TABLE: &'static str;
    /// Column naming the logical entity.
    const ENTITY_COLUMN: &'static str;
    /// Table whose `id` the entity column references.
    const ANCHOR_TABLE: &'static str;
    /// Value columns, in the order [`VersionedKind::bind_values`] produces them.
    const VALUE_COLUMNS: &'static [&'static str];

    type Values: Serialize + DeserializeOwned + Default + Clone + Debug + Send + Sync + Unpin;

    fn bind_values(values: &Self::Values) -> Vec<SqlValue>;

    fn values_from_row(row: &SqliteRow) -> Self::Values;

    /// Kind-specific checks run on the merged values before they are stored.
    fn validate(_values: &Self::Values) -> Result<(), AppError> {
        Ok(())
    }
}

/// Reads and writes year-scoped rows for every [`VersionedKind`].
pub struct VersionStore {
    pool: SqlitePool,
    years: Arc<AcademicYearAuthority>,
}

impl VersionStore {
    pub fn new(pool: SqlitePool, years: Arc<AcademicYearAuthority>) -> Self {
        Self { pool, years }
    }

    /// Write `patch` onto the entity's row for `academic_year` (default: the current year).
    ///
    /// Writing the current year updates (or creates by carrying the most recent prior values
    /// forward) the current row. Writing any other year only touches that year's historical row.
    pub async fn write_current_year_value<K: VersionedKind>(
        &self,
        entity_id: &str,
        academic_year: Option<&str>,
        patch: &Map<String, Value>,
    ) -> Result<VersionedRow<K::Values>, AppError> {
        let mut tx = self.pool.begin().await?;
        let row = write_in::<K>(&mut tx, entity_id, academic_year, patch).await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// The row flagged current for an entity.
    pub async fn current_record<K: VersionedKind>(
        &self,
        entity_id: &str,
    ) -> Result<Option<VersionedRow<K::Values>>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ? AND is_current_record = 1",
            select_columns::<K>(),
            K::TABLE,
            K::ENTITY_COLUMN
        );
        let row = sqlx::query(&sql)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(versioned_from_row::<K>))
    }

    /// The row an entity has for one specific year.
    pub async fn record_for_year<K: VersionedKind>(
        &self,
        entity_id: &str,
        academic_year: &str,
    ) -> Result<Option<VersionedRow<K::Values>>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ? AND academic_year_recorded = ?",
            select_columns::<K>(),
            K::TABLE,
            K::ENTITY_COLUMN
        );
        let row = sqlx::query(&sql)
            .bind(entity_id)
            .bind(academic_year)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(versioned_from_row::<K>))
    }

    /// Every stored row for an entity, newest year first.
    pub async fn history<K: VersionedKind>(
        &self,
        entity_id: &str,
    ) -> Result<RecordHistory<K::Values>, AppError> {
        let mut conn = self.pool.acquire().await?;
        ensure_anchor::<K>(&mut conn, entity_id).await?;
        let rows = load_rows::<K>(&mut conn, entity_id).await?;
        drop(conn);

        let selected = self.years.current_year().await?;
        let records: Vec<RecordView<K::Values>> = rows
            .into_iter()
            .map(|row| with_warning(row, selected.as_ref()))
            .collect();
        let current = records.iter().find(|r| r.record.is_current_record).cloned();

        Ok(RecordHistory {
            entity_id: entity_id.to_string(),
            current,
            records,
        })
    }

    /// Attach the cross-year advisory for the selected year.
    pub async fn view<K: VersionedKind>(
        &self,
        row: VersionedRow<K::Values>,
    ) -> Result<RecordView<K::Values>, AppError> {
        let selected = self.years.current_year().await?;
        Ok(with_warning(row, selected.as_ref()))
    }
}

/// Current rows whose anchor row has `anchor_column = value`.
pub async fn current_rows_by_anchor<K: VersionedKind>(
    pool: &SqlitePool,
    anchor_column: &'static str,
    value: &str,
) -> Result<Vec<VersionedRow<K::Values>>, AppError> {
    let sql = format!(
        "SELECT {cols} FROM {table} r JOIN {anchor} a ON a.id = r.{entity} WHERE a.{anchor_column} = ? AND r.is_current_record = 1 ORDER BY r.record_date",
        cols = prefixed_columns::<K>("r"),
        table = K::TABLE,
        anchor = K::ANCHOR_TABLE,
        entity = K::ENTITY_COLUMN,
    );
    let rows = sqlx::query(&sql).bind(value).fetch_all(pool).await?;
    Ok(rows.iter().map(versioned_from_row::<K>).collect())
}

/// Every row flagged current for a kind.
pub async fn current_rows<K: VersionedKind>(
    pool: &SqlitePool,
) -> Result<Vec<VersionedRow<K::Values>>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE is_current_record = 1",
        select_columns::<K>(),
        K::TABLE
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows.iter().map(versioned_from_row::<K>).collect())
}

/// Write inside an existing transaction. The caller bumps the revision and commits.
pub async fn write_in<K: VersionedKind>(
    conn: &mut SqliteConnection,
    entity_id: &str,
    academic_year: Option<&str>,
    patch: &Map<String, Value>,
) -> Result<VersionedRow<K::Values>, AppError> {
    let current_year = select_current_year(&mut *conn)
        .await?
        .ok_or_else(|| AppError::Validation("No academic year has been configured".to_string()))?;

    let target_year = academic_year.unwrap_or(&current_year.year_name).to_string();
    ensure_anchor::<K>(conn, entity_id).await?;
    ensure_year(conn, &target_year).await?;

    let rows = load_rows::<K>(conn, entity_id).await?;

    let written = if target_year == current_year.year_name {
        write_current::<K>(conn, entity_id, &target_year, &rows, patch).await?
    } else {
        write_historical::<K>(
            conn,
            entity_id,
            &target_year,
            &current_year.year_name,
            &rows,
            patch,
        )
        .await?
    };

    tracing::debug!(
        "{} {} written for {} (current: {})",
        K::NAME,
        entity_id,
        written.academic_year_recorded,
        written.is_current_record
    );

    Ok(written)
}

async fn write_current<K: VersionedKind>(
    conn: &mut SqliteConnection,
    entity_id: &str,
    year: &str,
    rows: &[VersionedRow<K::Values>],
    patch: &Map<String, Value>,
) -> Result<VersionedRow<K::Values>, AppError> {
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = rows.iter().find(|r| r.academic_year_recorded == year) {
        let values = apply_patch::<K>(&existing.values, patch)?;
        let record_date = if existing.is_current_record {
            existing.record_date.clone()
        } else {
            demote::<K>(conn, entity_id).await?;
            now
        };
        update_row::<K>(conn, entity_id, &existing.id, &values, true, &record_date).await?;
        return fetch_row::<K>(conn, &existing.id).await;
    }

    // Rows are sorted newest first, so the first older row is the most recent prior year.
    let base = rows
        .iter()
        .find(|r| r.academic_year_recorded.as_str() < year)
        .or_else(|| rows.iter().find(|r| r.is_current_record))
        .map(|r| r.values.clone())
        .unwrap_or_default();
    let values = apply_patch::<K>(&base, patch)?;

    demote::<K>(conn, entity_id).await?;
    let id = insert_row::<K>(conn, entity_id, year, &values, true, &now).await?;
    fetch_row::<K>(conn, &id).await
}

async fn write_historical<K: VersionedKind>(
    conn: &mut SqliteConnection,
    entity_id: &str,
    year: &str,
    current_year: &str,
    rows: &[VersionedRow<K::Values>],
    patch: &Map<String, Value>,
) -> Result<VersionedRow<K::Values>, AppError> {
    let now = Utc::now().to_rfc3339();
    let flagged = rows.iter().find(|r| r.is_current_record);

    // The target row is still the current view because the entity was never carried into the
    // current year. Carry it forward first so the current view keeps its values.
    if let Some(flagged) = flagged.filter(|r| r.academic_year_recorded == year) {
        promote_current_year::<K>(conn, entity_id, current_year, rows, &flagged.values).await?;
    }

    let written_id = match rows.iter().find(|r| r.academic_year_recorded == year) {
        Some(existing) => {
            let values = apply_patch::<K>(&existing.values, patch)?;
            update_row::<K>(
                conn,
                entity_id,
                &existing.id,
                &values,
                false,
                &existing.record_date,
            )
            .await?;
            existing.id.clone()
        }
        None => {
            let base = rows
                .iter()
                .find(|r| r.academic_year_recorded.as_str() < year)
                .map(|r| r.values.clone())
                .unwrap_or_default();
            let values = apply_patch::<K>(&base, patch)?;
            insert_row::<K>(conn, entity_id, year, &values, false, &now).await?
        }
    };

    let written = fetch_row::<K>(conn, &written_id).await?;

    if flagged.is_none() {
        promote_current_year::<K>(conn, entity_id, current_year, rows, &written.values).await?;
    }

    Ok(written)
}

/// Make the entity's current-year row the flagged one, creating it from `carry` if missing.
async fn promote_current_year<K: VersionedKind>(
    conn: &mut SqliteConnection,
    entity_id: &str,
    current_year: &str,
    rows: &[VersionedRow<K::Values>],
    carry: &K::Values,
) -> Result<(), AppError> {
    let now = Utc::now().to_rfc3339();
    demote::<K>(conn, entity_id).await?;

    match rows.iter().find(|r| r.academic_year_recorded == current_year) {
        Some(existing) => {
            update_row::<K>(conn, entity_id, &existing.id, &existing.values, true, &now).await?;
        }
        None => {
            insert_row::<K>(conn, entity_id, current_year, carry, true, &now).await?;
        }
    }
    Ok(())
}

/// Overlay a partial JSON object onto `base`. Unknown fields are rejected.
pub fn apply_patch<K: VersionedKind>(
    base: &K::Values,
    patch: &Map<String, Value>,
) -> Result<K::Values, AppError> {
    let mut merged = serde_json::to_value(base)?;
    if let Value::Object(fields) = &mut merged {
        for (key, value) in patch {
            fields.insert(key.clone(), value.clone());
        }
    }

    let values: K::Values = serde_json::from_value(merged)
        .map_err(|e| AppError::Validation(format!("Invalid {} values: {}", K::NAME, e)))?;
    K::validate(&values)?;
    Ok(values)
}

fn with_warning<V>(row: VersionedRow<V>, selected: Option<&AcademicYear>) -> RecordView<V> {
    let cross_year_warning = cross_year_warning(Some(&row.academic_year_recorded), selected);
    RecordView {
        record: row,
        cross_year_warning,
    }
}

async fn ensure_anchor<K: VersionedKind>(
    conn: &mut SqliteConnection,
    entity_id: &str,
) -> Result<(), AppError> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", K::ANCHOR_TABLE);
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(entity_id)
        .fetch_one(&mut *conn)
        .await?;
    if count == 0 {
        return Err(AppError::NotFound(format!(
            "{} {} not found",
            K::NAME,
            entity_id
        )));
    }
    Ok(())
}

async fn ensure_year(
    conn: &mut SqliteConnection,
    year: &str,
) -> Result<(), AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM academic_years WHERE year_name = ?")
        .bind(year)
        .fetch_one(&mut *conn)
        .await?;
    if count == 0 {
        return Err(AppError::NotFound(format!(
            "Academic year {} not found",
            year
        )));
    }
    Ok(())
}

async fn load_rows<K: VersionedKind>(
    conn: &mut SqliteConnection,
    entity_id: &str,
) -> Result<Vec<VersionedRow<K::Values>>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ? ORDER BY academic_year_recorded DESC",
        select_columns::<K>(),
        K::TABLE,
        K::ENTITY_COLUMN
    );
    let rows = sqlx::query(&sql)
        .bind(entity_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(versioned_from_row::<K>).collect())
}

async fn fetch_row<K: VersionedKind>(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<VersionedRow<K::Values>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?",
        select_columns::<K>(),
        K::TABLE
    );
    let row = sqlx::query(&sql).bind(id).fetch_one(&mut *conn).await?;
    Ok(versioned_from_row::<K>(&row))
}

async fn demote<K: VersionedKind>(
    conn: &mut SqliteConnection,
    entity_id: &str,
) -> Result<(), AppError> {
    let sql = format!(
        "UPDATE {} SET is_current_record = 0 WHERE {} = ? AND is_current_record = 1",
        K::TABLE,
        K::ENTITY_COLUMN
    );
    sqlx::query(&sql)
        .bind(entity_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| lost_race::<K>(entity_id, e))?;
    Ok(())
}

async fn insert_row<K: VersionedKind>(
    conn: &mut SqliteConnection,
    entity_id: &str,
    year: &str,
    values: &K::Values,
    is_current: bool,
    record_date: &str,
) -> Result<String, AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let placeholders = vec!["?"; K::VALUE_COLUMNS.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} (id, {}, academic_year_recorded, is_current_record, record_date, {}) VALUES (?, ?, ?, ?, ?, {})",
        K::TABLE,
        K::ENTITY_COLUMN,
        K::VALUE_COLUMNS.join(", "),
        placeholders
    );

    let mut query = sqlx::query(&sql)
        .bind(id.clone())
        .bind(entity_id.to_string())
        .bind(year.to_string())
        .bind(is_current as i32)
        .bind(record_date.to_string());
    for value in K::bind_values(values) {
        query = bind_value(query, value);
    }

    query
        .execute(&mut *conn)
        .await
        .map_err(|e| lost_race::<K>(entity_id, e))?;

    Ok(id)
}

async fn update_row<K: VersionedKind>(
    conn: &mut SqliteConnection,
    entity_id: &str,
    id: &str,
    values: &K::Values,
    is_current: bool,
    record_date: &str,
) -> Result<(), AppError> {
    let assignments: Vec<String> = K::VALUE_COLUMNS
        .iter()
        .map(|column| format!("{} = ?", column))
        .collect();
    let sql = format!(
        "UPDATE {} SET {}, is_current_record = ?, record_date = ? WHERE id = ?",
        K::TABLE,
        assignments.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for value in K::bind_values(values) {
        query = bind_value(query, value);
    }
    query
        .bind(is_current as i32)
        .bind(record_date.to_string())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| lost_race::<K>(entity_id, e))?;
    Ok(())
}

/// A write statement that lost a race with another writer of the same entity is a Conflict
/// the caller can retry as an update.
fn lost_race<K: VersionedKind>(entity_id: &str, err: sqlx::Error) -> AppError {
    if is_write_contention(&err) {
        tracing::debug!("{} {} lost a write race: {:?}", K::NAME, entity_id, err);
        return AppError::Conflict(format!(
            "{} {} was written by another request; retry as an update",
            K::NAME,
            entity_id
        ));
    }
    AppError::from(err)
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Real(v) => query.bind(v),
        SqlValue::Int(v) => query.bind(v),
    }
}

fn select_columns<K: VersionedKind>() -> String {
    format!(
        "id, {} AS entity_id, academic_year_recorded, is_current_record, record_date, {}",
        K::ENTITY_COLUMN,
        K::VALUE_COLUMNS.join(", ")
    )
}

fn prefixed_columns<K: VersionedKind>(alias: &str) -> String {
    let values: Vec<String> = K::VALUE_COLUMNS
        .iter()
        .map(|column| format!("{}.{}", alias, column))
        .collect();
    format!(
        "{a}.id, {a}.{} AS entity_id, {a}.academic_year_recorded, {a}.is_current_record, {a}.record_date, {}",
        K::ENTITY_COLUMN,
        values.join(", "),
        a = alias
    )
}

fn versioned_from_row<K: VersionedKind>(row: &SqliteRow) -> VersionedRow<K::Values> {
    let is_current: i32 = row.get("is_current_record");
    VersionedRow {
        id: row.get("id"),
        entity_id: row.get("entity_id"),
        academic_year_recorded: row.get("academic_year_recorded"),
        is_current_record: is_current != 0,
        record_date: row.get("record_date"),
        values: K::values_from_row(row),
    }
}
