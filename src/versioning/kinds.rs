//! The versioned kinds stored by the application.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{SqlValue, VersionedKind};
use crate::errors::AppError;
use crate::models::{ExamScoreValues, LetterValues, PhotoValues, StudentValues, TimelineEventValues};

/// Year-scoped student details (grade, school, enrollment).
pub struct StudentRecordKind;

impl VersionedKind for StudentRecordKind {
    const NAME: &'static str = "Student";
    const TABLE: &'static str = "student_records";
    const ENTITY_COLUMN: &'static str = "student_id";
    const ANCHOR_TABLE: &'static str = "students";
    const VALUE_COLUMNS: &'static [&'static str] =
        &["grade_level", "school_name", "enrollment_status", "notes"];

    type Values = StudentValues;

    fn bind_values(values: &StudentValues) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(values.grade_level.clone()),
            SqlValue::Text(values.school_name.clone()),
            SqlValue::Text(values.enrollment_status.clone()),
            SqlValue::Text(values.notes.clone()),
        ]
    }

    fn values_from_row(row: &SqliteRow) -> StudentValues {
        StudentValues {
            grade_level: row.get("grade_level"),
            school_name: row.get("school_name"),
            enrollment_status: row.get("enrollment_status"),
            notes: row.get("notes"),
        }
    }
}

/// Yearly student photo.
pub struct StudentPhotoKind;

impl VersionedKind for StudentPhotoKind {
    const NAME: &'static str = "Student photo";
    const TABLE: &'static str = "student_photos";
    const ENTITY_COLUMN: &'static str = "student_id";
    const ANCHOR_TABLE: &'static str = "students";
    const VALUE_COLUMNS: &'static [&'static str] = &["photo_url", "caption"];

    type Values = PhotoValues;

    fn bind_values(values: &PhotoValues) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(values.photo_url.clone()),
            SqlValue::Text(values.caption.clone()),
        ]
    }

    fn values_from_row(row: &SqliteRow) -> PhotoValues {
        PhotoValues {
            photo_url: row.get("photo_url"),
            caption: row.get("caption"),
        }
    }
}

/// A student's score on one exam.
pub struct ExamScoreKind;

impl VersionedKind for ExamScoreKind {
    const NAME: &'static str = "Exam score";
    const TABLE: &'static str = "exam_score_records";
    const ENTITY_COLUMN: &'static str = "score_id";
    const ANCHOR_TABLE: &'static str = "exam_scores";
    const VALUE_COLUMNS: &'static [&'static str] = &["score", "did_not_sit", "remarks"];

    type Values = ExamScoreValues;

    fn bind_values(values: &ExamScoreValues) -> Vec<SqlValue> {
        vec![
            SqlValue::Real(values.score),
            SqlValue::Int(Some(values.did_not_sit as i64)),
            SqlValue::Text(values.remarks.clone()),
        ]
    }

    fn values_from_row(row: &SqliteRow) -> ExamScoreValues {
        let did_not_sit: i64 = row.get("did_not_sit");
        ExamScoreValues {
            score: row.get("score"),
            did_not_sit: did_not_sit != 0,
            remarks: row.get("remarks"),
        }
    }

    fn validate(values: &ExamScoreValues) -> Result<(), AppError> {
        if let Some(score) = values.score {
            if score < 0.0 || !score.is_finite() {
                return Err(AppError::Validation(
                    "Score must be a non-negative number".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Letter exchanged between a student and a sponsor.
pub struct LetterKind;

impl VersionedKind for LetterKind {
    const NAME: &'static str = "Letter";
    const TABLE: &'static str = "letter_records";
    const ENTITY_COLUMN: &'static str = "letter_id";
    const ANCHOR_TABLE: &'static str = "letters";
    const VALUE_COLUMNS: &'static [&'static str] = &["title", "body", "letter_url", "sent_date"];

    type Values = LetterValues;

    fn bind_values(values: &LetterValues) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(values.title.clone()),
            SqlValue::Text(values.body.clone()),
            SqlValue::Text(values.letter_url.clone()),
            SqlValue::Text(values.sent_date.clone()),
        ]
    }

    fn values_from_row(row: &SqliteRow) -> LetterValues {
        LetterValues {
            title: row.get("title"),
            body: row.get("body"),
            letter_url: row.get("letter_url"),
            sent_date: row.get("sent_date"),
        }
    }
}

/// Narrative entry on a student's timeline.
pub struct TimelineEventKind;

impl VersionedKind for TimelineEventKind {
    const NAME: &'static str = "Timeline event";
    const TABLE: &'static str = "timeline_event_records";
    const ENTITY_COLUMN: &'static str = "event_id";
    const ANCHOR_TABLE: &'static str = "timeline_events";
    const VALUE_COLUMNS: &'static [&'static str] =
        &["event_type", "title", "description", "event_date"];

    type Values = TimelineEventValues;

    fn bind_values(values: &TimelineEventValues) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(values.event_type.clone()),
            SqlValue::Text(values.title.clone()),
            SqlValue::Text(values.description.clone()),
            SqlValue::Text(values.event_date.clone()),
        ]
    }

    fn values_from_row(row: &SqliteRow) -> TimelineEventValues {
        TimelineEventValues {
            event_type: row.get("event_type"),
            title: row.get("title"),
            description: row.get("description"),
            event_date: row.get("event_date"),
        }
    }
}
