//! Academic year selection authority.
//!
//! This is the only place that decides which academic year is current. Every consumer either
//! calls [`AcademicYearAuthority::current_year`] or, inside a transaction, [`select_current_year`];
//! both apply the same fallback. Year switches are published on a watch channel and bump the
//! revision so cached client views are invalidated without a reload.

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tokio::sync::watch;

use crate::db::{bump_revision, versioned_table_names};
use crate::errors::AppError;
use crate::models::{AcademicYear, CreateAcademicYearRequest, UpdateAcademicYearRequest};

const YEAR_COLUMNS: &str = "id, year_name, start_date, end_date, is_current, created_at";

/// Select the current academic year.
///
/// The flagged year wins; with none flagged, the year with the highest `year_name` is current.
pub async fn select_current_year<'e, E>(executor: E) -> Result<Option<AcademicYear>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {YEAR_COLUMNS} FROM academic_years ORDER BY is_current DESC, year_name DESC LIMIT 1"
    );
    let row = sqlx::query(&sql).fetch_optional(executor).await?;
    Ok(row.as_ref().map(year_from_row))
}

/// Build the advisory shown when a record's year differs from the selected year.
///
/// Returns `None` when the record year is unknown or equal to the selection. Never blocks.
pub fn cross_year_warning(
    record_year: Option<&str>,
    selected: Option<&AcademicYear>,
) -> Option<String> {
    let record_year = record_year?;
    match selected {
        Some(year) if year.year_name == record_year => None,
        Some(year) => Some(format!(
            "You are viewing a record from {}, not the selected academic year {}.",
            record_year, year.year_name
        )),
        None => Some(format!(
            "You are viewing a record from {}, but no academic year is selected.",
            record_year
        )),
    }
}

/// Single authority for the current academic year.
pub struct AcademicYearAuthority {
    pool: SqlitePool,
    selected: watch::Sender<Option<AcademicYear>>,
}

impl AcademicYearAuthority {
    /// Create the authority and publish the year currently selected in storage.
    pub async fn load(pool: SqlitePool) -> Result<Self, AppError> {
        let current = select_current_year(&pool).await?;
        let (selected, _) = watch::channel(current);
        Ok(Self { pool, selected })
    }

    /// All years, newest name first. The table holds one row per year of operation.
    pub async fn list_years(&self) -> Result<Vec<AcademicYear>, AppError> {
        let sql = format!("SELECT {YEAR_COLUMNS} FROM academic_years ORDER BY year_name DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(year_from_row).collect())
    }

    /// Get a year by ID.
    pub async fn get_year(&self, id: &str) -> Result<Option<AcademicYear>, AppError> {
        let sql = format!("SELECT {YEAR_COLUMNS} FROM academic_years WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(year_from_row))
    }

    /// The current academic year, read from storage.
    pub async fn current_year(&self) -> Result<Option<AcademicYear>, AppError> {
        Ok(select_current_year(&self.pool).await?)
    }

    /// The last published selection, without touching storage.
    pub fn selected(&self) -> Option<AcademicYear> {
        self.selected.borrow().clone()
    }

    /// Subscribe to year switches.
    pub fn subscribe(&self) -> watch::Receiver<Option<AcademicYear>> {
        self.selected.subscribe()
    }

    /// Make `id` the only current year.
    ///
    /// On failure nothing is published and storage is unchanged.
    pub async fn set_current_year(&self, id: &str) -> Result<AcademicYear, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE academic_years SET is_current = 0 WHERE is_current = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE academic_years SET is_current = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Academic year {} not found",
                id
            )));
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        let year = self
            .get_year(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Academic year {} not found", id)))?;

        tracing::info!("Current academic year switched to {}", year.year_name);
        self.selected.send_replace(Some(year.clone()));

        Ok(year)
    }

    /// Create a new academic year, optionally making it current.
    pub async fn create_year(
        &self,
        request: &CreateAcademicYearRequest,
    ) -> Result<AcademicYear, AppError> {
        validate_dates(request.start_date.as_deref(), request.end_date.as_deref())?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO academic_years (id, year_name, start_date, end_date, is_current, created_at) VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(request.year_name.trim())
        .bind(&request.start_date)
        .bind(&request.end_date)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        if request.is_current {
            return self.set_current_year(&id).await;
        }

        // A first year becomes current by fallback; publish it.
        self.refresh().await?;

        self.get_year(&id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Academic year {} vanished", id)))
    }

    /// Rename or re-date a year.
    pub async fn update_year(
        &self,
        id: &str,
        request: &UpdateAcademicYearRequest,
    ) -> Result<AcademicYear, AppError> {
        let existing = self
            .get_year(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Academic year {} not found", id)))?;

        let year_name = request
            .year_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.year_name)
            .to_string();
        let start_date = request.start_date.clone().or(existing.start_date.clone());
        let end_date = request.end_date.clone().or(existing.end_date.clone());
        validate_dates(start_date.as_deref(), end_date.as_deref())?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE academic_years SET year_name = ?, start_date = ?, end_date = ? WHERE id = ?",
        )
        .bind(&year_name)
        .bind(&start_date)
        .bind(&end_date)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // Records and exams reference years by name.
        if year_name != existing.year_name {
            for table in versioned_table_names() {
                let sql = format!(
                    "UPDATE {table} SET academic_year_recorded = ? WHERE academic_year_recorded = ?"
                );
                sqlx::query(&sql)
                    .bind(&year_name)
                    .bind(&existing.year_name)
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query("UPDATE exams SET academic_year = ? WHERE academic_year = ?")
                .bind(&year_name)
                .bind(&existing.year_name)
                .execute(&mut *tx)
                .await?;
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        self.refresh().await?;

        Ok(AcademicYear {
            year_name,
            start_date,
            end_date,
            ..existing
        })
    }

    /// Re-read the selection from storage and publish it if it changed.
    pub async fn refresh(&self) -> Result<Option<AcademicYear>, AppError> {
        let current = select_current_year(&self.pool).await?;
        self.selected.send_if_modified(|selected| {
            if *selected == current {
                false
            } else {
                *selected = current.clone();
                true
            }
        });
        Ok(current)
    }
}

fn validate_dates(start: Option<&str>, end: Option<&str>) -> Result<(), AppError> {
    let parse = |label: &str, value: Option<&str>| -> Result<Option<NaiveDate>, AppError> {
        value
            .map(|v| {
                NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(|_| {
                    AppError::Validation(format!("{} must be a YYYY-MM-DD date", label))
                })
            })
            .transpose()
    };

    let start = parse("startDate", start)?;
    let end = parse("endDate", end)?;
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::Validation(
                "endDate must not be before startDate".to_string(),
            ));
        }
    }
    Ok(())
}

fn year_from_row(row: &SqliteRow) -> AcademicYear {
    let is_current: i32 = row.get("is_current");
    AcademicYear {
        id: row.get("id"),
        year_name: row.get("year_name"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        is_current: is_current != 0,
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn authority() -> (AcademicYearAuthority, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (AcademicYearAuthority::load(pool).await.unwrap(), temp_dir)
    }

    fn create(name: &str, is_current: bool) -> CreateAcademicYearRequest {
        CreateAcademicYearRequest {
            year_name: name.to_string(),
            start_date: None,
            end_date: None,
            is_current,
        }
    }

    fn year(name: &str) -> AcademicYear {
        AcademicYear {
            id: name.to_string(),
            year_name: name.to_string(),
            start_date: None,
            end_date: None,
            is_current: true,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_cross_year_warning() {
        let selected = year("2024");
        assert!(cross_year_warning(None, Some(&selected)).is_none());
        assert!(cross_year_warning(Some("2024"), Some(&selected)).is_none());

        let warning = cross_year_warning(Some("2023"), Some(&selected)).unwrap();
        assert!(warning.contains("2023"));
        assert!(warning.contains("2024"));
    }

    #[tokio::test]
    async fn test_no_years_means_no_current_year() {
        let (years, _dir) = authority().await;
        assert!(years.current_year().await.unwrap().is_none());
        assert!(years.list_years().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_is_most_recent_year() {
        let (years, _dir) = authority().await;
        years.create_year(&create("2022", false)).await.unwrap();
        years.create_year(&create("2024", false)).await.unwrap();
        years.create_year(&create("2023", false)).await.unwrap();

        let names: Vec<String> = years
            .list_years()
            .await
            .unwrap()
            .into_iter()
            .map(|y| y.year_name)
            .collect();
        assert_eq!(names, vec!["2024", "2023", "2022"]);

        let current = years.current_year().await.unwrap().unwrap();
        assert_eq!(current.year_name, "2024");
        assert!(!current.is_current);
        assert_eq!(years.selected().unwrap().year_name, "2024");
    }

    #[tokio::test]
    async fn test_set_current_year_clears_others_and_publishes() {
        let (years, _dir) = authority().await;
        let a = years.create_year(&create("2023", true)).await.unwrap();
        let b = years.create_year(&create("2024", false)).await.unwrap();
        assert_eq!(years.current_year().await.unwrap().unwrap().id, a.id);

        let mut rx = years.subscribe();
        years.set_current_year(&b.id).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().clone().unwrap().id, b.id);
        assert_eq!(years.current_year().await.unwrap().unwrap().id, b.id);

        let flagged: Vec<AcademicYear> = years
            .list_years()
            .await
            .unwrap()
            .into_iter()
            .filter(|y| y.is_current)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, b.id);
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_selection() {
        let (years, _dir) = authority().await;
        let a = years.create_year(&create("2023", true)).await.unwrap();

        let err = years.set_current_year("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(years.selected().unwrap().id, a.id);
        assert_eq!(years.current_year().await.unwrap().unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_invalid_dates_are_rejected() {
        let (years, _dir) = authority().await;
        let request = CreateAcademicYearRequest {
            year_name: "2024".into(),
            start_date: Some("2024-09-01".into()),
            end_date: Some("2024-06-30".into()),
            is_current: false,
        };
        let err = years.create_year(&request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
