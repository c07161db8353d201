//! Student model.
//!
//! `Student` is the logical entity; year-scoped fields live in versioned records.

use serde::{Deserialize, Serialize};

use super::{LetterValues, StudentValues, TimelineEventValues, VersionedRow};

/// A sponsored (or awaiting sponsorship) student.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Weak reference; cleared, never cascaded, when the sponsor goes away
    pub sponsor_id: Option<String>,
    pub sponsored_since: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A student joined with its current-year record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentWithRecord {
    #[serde(flatten)]
    pub student: Student,
    pub current_record: Option<VersionedRow<StudentValues>>,
}

/// Request body for creating a student together with its first year record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub record: serde_json::Map<String, serde_json::Value>,
}

/// Request body for updating a student's identity fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// Query parameters for listing students.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentListQuery {
    #[serde(default)]
    pub sponsor_id: Option<String>,
}

/// Request body for linking a student to a sponsor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignSponsorRequest {
    pub sponsor_id: String,
    #[serde(default)]
    pub sponsored_since: Option<String>,
}

/// A relative or guardian of a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relative {
    pub id: String,
    pub student_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

/// Request body for adding a relative.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelativeRequest {
    pub name: String,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A letter anchor with its current-year contents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterView {
    pub id: String,
    pub student_id: String,
    pub sponsor_id: Option<String>,
    pub created_at: String,
    pub record: Option<VersionedRow<LetterValues>>,
}

/// Request body for creating a letter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLetterRequest {
    #[serde(default)]
    pub sponsor_id: Option<String>,
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

/// A student timeline anchor with its current-year contents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEventView {
    pub id: String,
    pub student_id: String,
    pub created_at: String,
    pub record: Option<VersionedRow<TimelineEventValues>>,
}

/// Request body for appending a student timeline event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimelineEventRequest {
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub values: serde_json::Map<String, serde_json::Value>,
}
