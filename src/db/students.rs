//! Student operations, including relatives, letters and the student timeline.
//!
//! Year-scoped fields never go through here directly: the first record of a new student,
//! letter or timeline event is written by the versioned writer inside the same transaction
//! that creates its anchor row.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{bump_revision, Repository};
use crate::errors::AppError;
use crate::models::{
    AssignSponsorRequest, CreateLetterRequest, CreateRelativeRequest, CreateStudentRequest,
    CreateTimelineEventRequest, LetterView, Relative, Student, StudentWithRecord,
    TimelineEventView, UpdateStudentRequest,
};
use crate::versioning::{
    current_rows, current_rows_by_anchor, write_in, LetterKind, StudentRecordKind,
    TimelineEventKind,
};

const STUDENT_COLUMNS: &str = "id, first_name, last_name, date_of_birth, gender, sponsor_id, sponsored_since, created_at, updated_at";

impl Repository {
    /// List students with their current records, optionally only those of one sponsor.
    pub async fn list_students(
        &self,
        sponsor_id: Option<&str>,
    ) -> Result<Vec<StudentWithRecord>, AppError> {
        let rows = match sponsor_id {
            Some(sponsor_id) => {
                let sql = format!(
                    "SELECT {STUDENT_COLUMNS} FROM students WHERE sponsor_id = ? ORDER BY last_name, first_name"
                );
                sqlx::query(&sql)
                    .bind(sponsor_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql =
                    format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY last_name, first_name");
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        let mut records: HashMap<String, _> = match sponsor_id {
            Some(sponsor_id) => {
                current_rows_by_anchor::<StudentRecordKind>(&self.pool, "sponsor_id", sponsor_id)
                    .await?
            }
            None => current_rows::<StudentRecordKind>(&self.pool).await?,
        }
        .into_iter()
        .map(|r| (r.entity_id.clone(), r))
        .collect();

        Ok(rows
            .iter()
            .map(student_from_row)
            .map(|student| StudentWithRecord {
                current_record: records.remove(&student.id),
                student,
            })
            .collect())
    }

    /// Get a student by ID.
    pub async fn get_student(&self, id: &str) -> Result<Option<Student>, AppError> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(student_from_row))
    }

    /// Create a student together with its current-year record.
    pub async fn create_student(
        &self,
        request: &CreateStudentRequest,
    ) -> Result<StudentWithRecord, AppError> {
        let now = Utc::now().to_rfc3339();
        let student = Student {
            id: uuid::Uuid::new_v4().to_string(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            date_of_birth: request.date_of_birth.clone(),
            gender: request.gender.clone(),
            sponsor_id: None,
            sponsored_since: None,
            created_at: now.clone(),
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO students (id, first_name, last_name, date_of_birth, gender, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&student.id)
        .bind(&student.first_name)
        .bind(&student.last_name)
        .bind(&student.date_of_birth)
        .bind(&student.gender)
        .bind(&student.created_at)
        .bind(&student.updated_at)
        .execute(&mut *tx)
        .await?;

        let record = write_in::<StudentRecordKind>(&mut tx, &student.id, None, &request.record).await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(StudentWithRecord {
            student,
            current_record: Some(record),
        })
    }

    /// Update a student's identity fields.
    pub async fn update_student(
        &self,
        id: &str,
        request: &UpdateStudentRequest,
    ) -> Result<Student, AppError> {
        let existing = self
            .get_student(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;

        let updated = Student {
            first_name: request
                .first_name
                .as_deref()
                .map(|s| s.trim().to_string())
                .unwrap_or(existing.first_name),
            last_name: request
                .last_name
                .as_deref()
                .map(|s| s.trim().to_string())
                .unwrap_or(existing.last_name),
            date_of_birth: request.date_of_birth.clone().or(existing.date_of_birth),
            gender: request.gender.clone().or(existing.gender),
            updated_at: Utc::now().to_rfc3339(),
            ..existing
        };
        if updated.first_name.is_empty() || updated.last_name.is_empty() {
            return Err(AppError::Validation(
                "firstName and lastName are required".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE students SET first_name = ?, last_name = ?, date_of_birth = ?, gender = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&updated.first_name)
        .bind(&updated.last_name)
        .bind(&updated.date_of_birth)
        .bind(&updated.gender)
        .bind(&updated.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Delete a student and everything hanging off it.
    pub async fn delete_student(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Student {} not found", id)));
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Link a student to a sponsor.
    pub async fn assign_sponsor(
        &self,
        student_id: &str,
        request: &AssignSponsorRequest,
    ) -> Result<Student, AppError> {
        if self.get_sponsor(&request.sponsor_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Sponsor {} not found",
                request.sponsor_id
            )));
        }

        let now = Utc::now();
        let sponsored_since = request
            .sponsored_since
            .clone()
            .unwrap_or_else(|| now.format("%Y-%m-%d").to_string());

        self.set_sponsor_link(
            student_id,
            Some(&request.sponsor_id),
            Some(&sponsored_since),
            &now.to_rfc3339(),
        )
        .await
    }

    /// Clear a student's sponsor. The student and its records are untouched.
    pub async fn unassign_sponsor(&self, student_id: &str) -> Result<Student, AppError> {
        self.set_sponsor_link(student_id, None, None, &Utc::now().to_rfc3339())
            .await
    }

    async fn set_sponsor_link(
        &self,
        student_id: &str,
        sponsor_id: Option<&str>,
        sponsored_since: Option<&str>,
        now: &str,
    ) -> Result<Student, AppError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE students SET sponsor_id = ?, sponsored_since = ?, updated_at = ? WHERE id = ?",
        )
        .bind(sponsor_id)
        .bind(sponsored_since)
        .bind(now)
        .bind(student_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Student {} not found", student_id)));
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        self.get_student(student_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", student_id)))
    }

    // ==================== RELATIVES ====================

    /// List a student's relatives.
    pub async fn list_relatives(&self, student_id: &str) -> Result<Vec<Relative>, AppError> {
        self.require_student(student_id).await?;

        let rows = sqlx::query(
            "SELECT id, student_id, name, relationship, phone, notes, created_at FROM relatives WHERE student_id = ? ORDER BY name",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(relative_from_row).collect())
    }

    /// Add a relative to a student.
    pub async fn create_relative(
        &self,
        student_id: &str,
        request: &CreateRelativeRequest,
    ) -> Result<Relative, AppError> {
        self.require_student(student_id).await?;

        let relative = Relative {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            name: request.name.trim().to_string(),
            relationship: request.relationship.clone(),
            phone: request.phone.clone(),
            notes: request.notes.clone(),
            created_at: Utc::now().to_rfc3339(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO relatives (id, student_id, name, relationship, phone, notes, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&relative.id)
        .bind(&relative.student_id)
        .bind(&relative.name)
        .bind(&relative.relationship)
        .bind(&relative.phone)
        .bind(&relative.notes)
        .bind(&relative.created_at)
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(relative)
    }

    /// Remove a relative.
    pub async fn delete_relative(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM relatives WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Relative {} not found", id)));
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    // ==================== TIMELINE ====================

    /// Student timeline with each event's current record, oldest first.
    pub async fn list_timeline_events(
        &self,
        student_id: &str,
    ) -> Result<Vec<TimelineEventView>, AppError> {
        self.require_student(student_id).await?;

        let anchors = self.anchors("timeline_events", student_id).await?;
        let mut records: HashMap<String, _> =
            current_rows_by_anchor::<TimelineEventKind>(&self.pool, "student_id", student_id)
                .await?
                .into_iter()
                .map(|r| (r.entity_id.clone(), r))
                .collect();

        Ok(anchors
            .into_iter()
            .map(|(id, created_at)| TimelineEventView {
                record: records.remove(&id),
                id,
                student_id: student_id.to_string(),
                created_at,
            })
            .collect())
    }

    /// Append an event to a student's timeline.
    pub async fn create_timeline_event(
        &self,
        student_id: &str,
        request: &CreateTimelineEventRequest,
    ) -> Result<TimelineEventView, AppError> {
        self.require_student(student_id).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO timeline_events (id, student_id, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(student_id)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

        let values = with_default_date(&request.values, "eventDate");
        let record = write_in::<TimelineEventKind>(
            &mut tx,
            &id,
            request.academic_year.as_deref(),
            &values,
        )
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(TimelineEventView {
            id,
            student_id: student_id.to_string(),
            created_at,
            record: Some(record),
        })
    }

    // ==================== LETTERS ====================

    /// Letters for a student with their current records, oldest first.
    pub async fn list_letters(&self, student_id: &str) -> Result<Vec<LetterView>, AppError> {
        self.require_student(student_id).await?;

        let rows = sqlx::query(
            "SELECT id, sponsor_id, created_at FROM letters WHERE student_id = ? ORDER BY created_at",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        let mut records: HashMap<String, _> =
            current_rows_by_anchor::<LetterKind>(&self.pool, "student_id", student_id)
                .await?
                .into_iter()
                .map(|r| (r.entity_id.clone(), r))
                .collect();

        Ok(rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                LetterView {
                    record: records.remove(&id),
                    id,
                    student_id: student_id.to_string(),
                    sponsor_id: row.get("sponsor_id"),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    /// Record a letter. Without an explicit sponsor the student's current sponsor is used.
    pub async fn create_letter(
        &self,
        student_id: &str,
        request: &CreateLetterRequest,
    ) -> Result<LetterView, AppError> {
        let student = self.require_student(student_id).await?;
        let sponsor_id = request.sponsor_id.clone().or(student.sponsor_id);
        if let Some(sponsor_id) = &sponsor_id {
            if self.get_sponsor(sponsor_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Sponsor {} not found", sponsor_id)));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO letters (id, student_id, sponsor_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(student_id)
        .bind(&sponsor_id)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        let values = with_default_date(&request.values, "sentDate");
        let record =
            write_in::<LetterKind>(&mut tx, &id, request.academic_year.as_deref(), &values)
                .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(LetterView {
            id,
            student_id: student_id.to_string(),
            sponsor_id,
            created_at,
            record: Some(record),
        })
    }

    async fn require_student(&self, id: &str) -> Result<Student, AppError> {
        self.get_student(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))
    }

    async fn anchors(
        &self,
        table: &'static str,
        student_id: &str,
    ) -> Result<Vec<(String, String)>, AppError> {
        let sql = format!("SELECT id, created_at FROM {table} WHERE student_id = ? ORDER BY created_at");
        let rows = sqlx::query(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("created_at")))
            .collect())
    }
}

/// Fill `field` with today's date when the caller left it out.
fn with_default_date(values: &Map<String, Value>, field: &str) -> Map<String, Value> {
    let mut values = values.clone();
    if !values.contains_key(field) {
        values.insert(
            field.to_string(),
            Value::String(Utc::now().format("%Y-%m-%d").to_string()),
        );
    }
    values
}

fn student_from_row(row: &SqliteRow) -> Student {
    Student {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        date_of_birth: row.get("date_of_birth"),
        gender: row.get("gender"),
        sponsor_id: row.get("sponsor_id"),
        sponsored_since: row.get("sponsored_since"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn relative_from_row(row: &SqliteRow) -> Relative {
    Relative {
        id: row.get("id"),
        student_id: row.get("student_id"),
        name: row.get("name"),
        relationship: row.get("relationship"),
        phone: row.get("phone"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::models::{CreateSponsorRequest, SponsorStatus};
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        sqlx::query("INSERT INTO academic_years (id, year_name, is_current, created_at) VALUES ('y24', '2024', 1, 'now')")
            .execute(&pool)
            .await
            .unwrap();
        (Repository::new(pool), temp_dir)
    }

    fn new_student(record: Value) -> CreateStudentRequest {
        CreateStudentRequest {
            first_name: "Amani".to_string(),
            last_name: "Njeri".to_string(),
            date_of_birth: None,
            gender: None,
            record: match record {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    async fn new_sponsor(repo: &Repository) -> String {
        repo.create_sponsor(&CreateSponsorRequest {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: None,
            secondary_email: None,
            phone: None,
            address: None,
            status: SponsorStatus::Active,
            start_date: None,
            profile_image_url: None,
            primary_email_for_updates: None,
            notes: None,
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_create_student_writes_current_record() {
        let (repo, _dir) = setup().await;
        let created = repo
            .create_student(&new_student(json!({ "gradeLevel": "4" })))
            .await
            .unwrap();

        let record = created.current_record.unwrap();
        assert_eq!(record.academic_year_recorded, "2024");
        assert!(record.is_current_record);

        let listed = repo.list_students(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0].current_record.as_ref().unwrap().values.grade_level.as_deref(),
            Some("4")
        );
    }

    #[tokio::test]
    async fn test_invalid_first_record_leaves_no_student() {
        let (repo, _dir) = setup().await;
        let err = repo
            .create_student(&new_student(json!({ "shoeSize": 38 })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(repo.list_students(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleting_sponsor_keeps_student_and_history() {
        let (repo, _dir) = setup().await;
        let sponsor_id = new_sponsor(&repo).await;
        let student = repo
            .create_student(&new_student(json!({ "schoolName": "Hillside" })))
            .await
            .unwrap()
            .student;

        let linked = repo
            .assign_sponsor(
                &student.id,
                &AssignSponsorRequest {
                    sponsor_id: sponsor_id.clone(),
                    sponsored_since: Some("2024-02-01".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(linked.sponsor_id.as_deref(), Some(sponsor_id.as_str()));
        assert_eq!(repo.list_students(Some(&sponsor_id)).await.unwrap().len(), 1);

        repo.delete_sponsor(&sponsor_id).await.unwrap();

        let after = repo.get_student(&student.id).await.unwrap().unwrap();
        assert_eq!(after.sponsor_id, None);
        assert_eq!(after.sponsored_since, None);
        let listed = repo.list_students(None).await.unwrap();
        assert_eq!(
            listed[0].current_record.as_ref().unwrap().values.school_name.as_deref(),
            Some("Hillside")
        );
    }

    #[tokio::test]
    async fn test_assigning_unknown_sponsor_is_not_found() {
        let (repo, _dir) = setup().await;
        let student = repo
            .create_student(&new_student(json!({})))
            .await
            .unwrap()
            .student;

        let err = repo
            .assign_sponsor(
                &student.id,
                &AssignSponsorRequest {
                    sponsor_id: "nobody".to_string(),
                    sponsored_since: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_letter_defaults_to_current_sponsor() {
        let (repo, _dir) = setup().await;
        let sponsor_id = new_sponsor(&repo).await;
        let student = repo
            .create_student(&new_student(json!({})))
            .await
            .unwrap()
            .student;
        repo.assign_sponsor(
            &student.id,
            &AssignSponsorRequest {
                sponsor_id: sponsor_id.clone(),
                sponsored_since: None,
            },
        )
        .await
        .unwrap();

        let letter = repo
            .create_letter(
                &student.id,
                &CreateLetterRequest {
                    sponsor_id: None,
                    academic_year: None,
                    values: match json!({ "title": "Thank you" }) {
                        Value::Object(map) => map,
                        _ => unreachable!(),
                    },
                },
            )
            .await
            .unwrap();
        assert_eq!(letter.sponsor_id.as_deref(), Some(sponsor_id.as_str()));
        assert!(letter.record.unwrap().values.sent_date.is_some());

        let letters = repo.list_letters(&student.id).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(
            letters[0].record.as_ref().unwrap().values.title.as_deref(),
            Some("Thank you")
        );
    }

    #[tokio::test]
    async fn test_relatives_round_trip() {
        let (repo, _dir) = setup().await;
        let student = repo
            .create_student(&new_student(json!({})))
            .await
            .unwrap()
            .student;

        let relative = repo
            .create_relative(
                &student.id,
                &CreateRelativeRequest {
                    name: "Wanjiru".to_string(),
                    relationship: Some("Grandmother".to_string()),
                    phone: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(repo.list_relatives(&student.id).await.unwrap().len(), 1);

        repo.delete_relative(&relative.id).await.unwrap();
        assert!(repo.list_relatives(&student.id).await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_relative(&relative.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
