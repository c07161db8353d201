//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. Domain operations live in the
//! sibling modules as further `impl Repository` blocks.

use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{DashboardSummary, RevisionInfo};
use crate::years::select_current_year;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Counts for the current academic year.
    pub async fn dashboard(&self) -> Result<DashboardSummary, AppError> {
        let year = select_current_year(&self.pool).await?;

        let students = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(sponsor_id) AS sponsored FROM students",
        )
        .fetch_one(&self.pool)
        .await?;
        let total_students: i64 = students.get("total");
        let sponsored_students: i64 = students.get("sponsored");

        let sponsors = sqlx::query(
            "SELECT COALESCE(SUM(status = 'active'), 0) AS active, COALESCE(SUM(status = 'inactive'), 0) AS inactive FROM sponsors",
        )
        .fetch_one(&self.pool)
        .await?;

        let mut summary = DashboardSummary {
            academic_year: year.as_ref().map(|y| y.year_name.clone()),
            total_students,
            sponsored_students,
            unsponsored_students: total_students - sponsored_students,
            active_sponsors: sponsors.get("active"),
            inactive_sponsors: sponsors.get("inactive"),
            ..Default::default()
        };

        let Some(year) = year else {
            return Ok(summary);
        };

        summary.exams_this_year =
            sqlx::query_scalar("SELECT COUNT(*) FROM exams WHERE academic_year = ?")
                .bind(&year.year_name)
                .fetch_one(&self.pool)
                .await?;

        let scores = sqlx::query(
            r#"SELECT COUNT(*) AS recorded,
                      COALESCE(SUM(r.score >= e.passing_score), 0) AS passed
               FROM exam_score_records r
               JOIN exam_scores s ON s.id = r.score_id
               JOIN exams e ON e.id = s.exam_id
               WHERE r.is_current_record = 1
                 AND e.academic_year = ?
                 AND r.did_not_sit = 0
                 AND r.score IS NOT NULL"#,
        )
        .bind(&year.year_name)
        .fetch_one(&self.pool)
        .await?;

        summary.scores_recorded = scores.get("recorded");
        summary.scores_passed = scores.get("passed");
        if summary.scores_recorded > 0 {
            summary.pass_rate =
                Some(summary.scores_passed as f64 / summary.scores_recorded as f64 * 100.0);
        }

        Ok(summary)
    }
}
