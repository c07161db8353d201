//! Exam and exam score operations.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{bump_revision, Repository};
use crate::errors::AppError;
use crate::models::{CreateExamRequest, CreateScoreRequest, Exam, ScoreView, UpdateExamRequest};
use crate::versioning::{current_rows_by_anchor, write_in, ExamScoreKind};
use crate::years::select_current_year;

const EXAM_COLUMNS: &str = "id, name, term, academic_year, max_score, passing_score, created_at";

impl Repository {
    /// List exams, optionally for one academic year.
    pub async fn list_exams(&self, academic_year: Option<&str>) -> Result<Vec<Exam>, AppError> {
        let rows = match academic_year {
            Some(year) => {
                let sql = format!(
                    "SELECT {EXAM_COLUMNS} FROM exams WHERE academic_year = ? ORDER BY created_at"
                );
                sqlx::query(&sql).bind(year).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!(
                    "SELECT {EXAM_COLUMNS} FROM exams ORDER BY academic_year DESC, created_at"
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        Ok(rows.iter().map(exam_from_row).collect())
    }

    /// Get an exam by ID.
    pub async fn get_exam(&self, id: &str) -> Result<Option<Exam>, AppError> {
        let sql = format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(exam_from_row))
    }

    /// The exam a score anchor belongs to.
    pub async fn exam_for_score(&self, score_id: &str) -> Result<Option<Exam>, AppError> {
        let sql = format!(
            "SELECT {} FROM exams WHERE id = (SELECT exam_id FROM exam_scores WHERE id = ?)",
            EXAM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(score_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(exam_from_row))
    }

    /// Create an exam, in the current academic year unless one is named.
    pub async fn create_exam(&self, request: &CreateExamRequest) -> Result<Exam, AppError> {
        validate_scores(request.max_score, request.passing_score)?;

        let mut tx = self.pool.begin().await?;

        let academic_year = match &request.academic_year {
            Some(year) => {
                let known: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM academic_years WHERE year_name = ?")
                        .bind(year)
                        .fetch_one(&mut *tx)
                        .await?;
                if known == 0 {
                    return Err(AppError::NotFound(format!("Academic year {} not found", year)));
                }
                year.clone()
            }
            None => {
                select_current_year(&mut *tx)
                    .await?
                    .ok_or_else(|| {
                        AppError::Validation("No academic year has been configured".to_string())
                    })?
                    .year_name
            }
        };

        let exam = Exam {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name.trim().to_string(),
            term: request.term.clone(),
            academic_year,
            max_score: request.max_score,
            passing_score: request.passing_score,
            created_at: Utc::now().to_rfc3339(),
        };

        sqlx::query(
            "INSERT INTO exams (id, name, term, academic_year, max_score, passing_score, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&exam.id)
        .bind(&exam.name)
        .bind(&exam.term)
        .bind(&exam.academic_year)
        .bind(exam.max_score)
        .bind(exam.passing_score)
        .bind(&exam.created_at)
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(exam)
    }

    /// Update an exam's name, term or scoring bounds.
    pub async fn update_exam(&self, id: &str, request: &UpdateExamRequest) -> Result<Exam, AppError> {
        let existing = self
            .get_exam(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Exam {} not found", id)))?;

        let updated = Exam {
            name: request
                .name
                .as_deref()
                .map(|s| s.trim().to_string())
                .unwrap_or(existing.name),
            term: request.term.clone().or(existing.term),
            max_score: request.max_score.unwrap_or(existing.max_score),
            passing_score: request.passing_score.unwrap_or(existing.passing_score),
            ..existing
        };
        if updated.name.is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }
        validate_scores(updated.max_score, updated.passing_score)?;

        let mut tx = self.pool.begin().await?;

        // Recorded scores, historical rows included, must stay within the bounds.
        let highest: Option<f64> = sqlx::query_scalar(
            "SELECT MAX(r.score) FROM exam_score_records r JOIN exam_scores s ON s.id = r.score_id WHERE s.exam_id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if let Some(highest) = highest.filter(|h| *h > updated.max_score) {
            return Err(AppError::Validation(format!(
                "maxScore {} is below the recorded score {}",
                updated.max_score, highest
            )));
        }

        sqlx::query(
            "UPDATE exams SET name = ?, term = ?, max_score = ?, passing_score = ? WHERE id = ?",
        )
        .bind(&updated.name)
        .bind(&updated.term)
        .bind(updated.max_score)
        .bind(updated.passing_score)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Delete an exam and its scores.
    pub async fn delete_exam(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM exams WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Exam {} not found", id)));
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Record a student's first score on an exam.
    ///
    /// A second score for the same pair is a conflict; later corrections go through the
    /// versioned record endpoint of the returned `scoreId`.
    pub async fn create_score(
        &self,
        exam_id: &str,
        request: &CreateScoreRequest,
    ) -> Result<ScoreView, AppError> {
        let exam = self
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Exam {} not found", exam_id)))?;

        if !request.did_not_sit {
            match request.score {
                Some(score) if (0.0..=exam.max_score).contains(&score) => {}
                Some(_) => {
                    return Err(AppError::Validation(format!(
                        "score must be between 0 and {}",
                        exam.max_score
                    )))
                }
                None => {
                    return Err(AppError::Validation(
                        "score is required unless didNotSit is set".to_string(),
                    ))
                }
            }
        }
        if self.get_student(&request.student_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Student {} not found",
                request.student_id
            )));
        }

        let score_id = uuid::Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO exam_scores (id, student_id, exam_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&score_id)
        .bind(&request.student_id)
        .bind(exam_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!(
                "Student {} already has a score for exam {}",
                request.student_id, exam_id
            )),
            other => other,
        })?;

        let mut values = Map::new();
        values.insert("score".to_string(), serde_json::to_value(request.score)?);
        values.insert("didNotSit".to_string(), Value::Bool(request.did_not_sit));
        values.insert("remarks".to_string(), serde_json::to_value(&request.remarks)?);

        let year = request
            .academic_year
            .as_deref()
            .unwrap_or(&exam.academic_year);
        let record = write_in::<ExamScoreKind>(&mut tx, &score_id, Some(year), &values).await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(ScoreView {
            percentage: exam.percentage(&record.values),
            passed: exam.passed(&record.values),
            score_id,
            student_id: request.student_id.clone(),
            exam_id: exam_id.to_string(),
            record: Some(record),
        })
    }

    /// Current scores for an exam with derived percentages.
    pub async fn list_scores(&self, exam_id: &str) -> Result<Vec<ScoreView>, AppError> {
        let exam = self
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Exam {} not found", exam_id)))?;

        let anchors = sqlx::query(
            "SELECT id, student_id FROM exam_scores WHERE exam_id = ? ORDER BY created_at",
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        let mut records: HashMap<String, _> =
            current_rows_by_anchor::<ExamScoreKind>(&self.pool, "exam_id", exam_id)
                .await?
                .into_iter()
                .map(|r| (r.entity_id.clone(), r))
                .collect();

        Ok(anchors
            .iter()
            .map(|row| {
                let score_id: String = row.get("id");
                let record = records.remove(&score_id);
                ScoreView {
                    percentage: record.as_ref().and_then(|r| exam.percentage(&r.values)),
                    passed: record.as_ref().and_then(|r| exam.passed(&r.values)),
                    score_id,
                    student_id: row.get("student_id"),
                    exam_id: exam_id.to_string(),
                    record,
                }
            })
            .collect())
    }
}

fn validate_scores(max_score: f64, passing_score: f64) -> Result<(), AppError> {
    if !(max_score > 0.0) {
        return Err(AppError::Validation(
            "maxScore must be greater than 0".to_string(),
        ));
    }
    if !(0.0..=max_score).contains(&passing_score) {
        return Err(AppError::Validation(
            "passingScore must be between 0 and maxScore".to_string(),
        ));
    }
    Ok(())
}

fn exam_from_row(row: &SqliteRow) -> Exam {
    Exam {
        id: row.get("id"),
        name: row.get("name"),
        term: row.get("term"),
        academic_year: row.get("academic_year"),
        max_score: row.get("max_score"),
        passing_score: row.get("passing_score"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn setup() -> (Repository, Exam, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        sqlx::query("INSERT INTO academic_years (id, year_name, is_current, created_at) VALUES ('y24', '2024', 1, 'now')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO students (id, first_name, last_name, created_at, updated_at) VALUES ('s1', 'Amani', 'Njeri', 'now', 'now')")
            .execute(&pool)
            .await
            .unwrap();

        let repo = Repository::new(pool);
        let exam = repo
            .create_exam(&CreateExamRequest {
                name: "Mathematics".to_string(),
                term: Some("Term 1".to_string()),
                academic_year: None,
                max_score: 50.0,
                passing_score: 25.0,
            })
            .await
            .unwrap();
        (repo, exam, temp_dir)
    }

    fn score(value: Option<f64>, did_not_sit: bool) -> CreateScoreRequest {
        CreateScoreRequest {
            student_id: "s1".to_string(),
            academic_year: None,
            score: value,
            did_not_sit,
            remarks: None,
        }
    }

    #[tokio::test]
    async fn test_exam_defaults_to_current_year() {
        let (_repo, exam, _dir) = setup().await;
        assert_eq!(exam.academic_year, "2024");
    }

    #[tokio::test]
    async fn test_invalid_bounds_are_rejected() {
        let (repo, _exam, _dir) = setup().await;
        let err = repo
            .create_exam(&CreateExamRequest {
                name: "English".to_string(),
                term: None,
                academic_year: None,
                max_score: 10.0,
                passing_score: 11.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_score_percentage_and_duplicate() {
        let (repo, exam, _dir) = setup().await;

        let view = repo.create_score(&exam.id, &score(Some(40.0), false)).await.unwrap();
        assert_eq!(view.percentage, Some(80.0));
        assert_eq!(view.passed, Some(true));

        let err = repo
            .create_score(&exam.id, &score(Some(10.0), false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let scores = repo.list_scores(&exam.id).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].percentage, Some(80.0));
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_rejected() {
        let (repo, exam, _dir) = setup().await;
        let err = repo
            .create_score(&exam.id, &score(Some(51.0), false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let view = repo.create_score(&exam.id, &score(None, true)).await.unwrap();
        assert_eq!(view.percentage, None);
    }

    #[tokio::test]
    async fn test_dashboard_pass_rate() {
        let (repo, exam, _dir) = setup().await;
        repo.create_score(&exam.id, &score(Some(30.0), false)).await.unwrap();

        let summary = repo.dashboard().await.unwrap();
        assert_eq!(summary.academic_year.as_deref(), Some("2024"));
        assert_eq!(summary.exams_this_year, 1);
        assert_eq!(summary.scores_recorded, 1);
        assert_eq!(summary.pass_rate, Some(100.0));
    }
}
