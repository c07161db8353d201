//! Year-scoped record models.
//!
//! Every versioned kind stores one row per (entity, academic year). The `Values` structs hold
//! the year-scoped fields; the bookkeeping columns live on [`VersionedRow`].

use serde::{Deserialize, Serialize};

/// One stored snapshot of an entity for a single academic year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedRow<V> {
    pub id: String,
    pub entity_id: String,
    pub academic_year_recorded: String,
    pub is_current_record: bool,
    /// When this row became (or was last written as) the current snapshot
    pub record_date: String,
    pub values: V,
}

/// Request body for writing a year-scoped value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRecordRequest {
    /// Year the write applies to; defaults to the current academic year
    #[serde(default)]
    pub academic_year: Option<String>,
    /// Partial set of value fields; omitted fields keep their carried-forward values
    #[serde(default)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

/// A row plus the advisory shown when it belongs to a different year than the selected one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView<V> {
    #[serde(flatten)]
    pub record: VersionedRow<V>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_year_warning: Option<String>,
}

/// Full history of an entity, newest year first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordHistory<V> {
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<RecordView<V>>,
    pub records: Vec<RecordView<V>>,
}

/// Year-scoped student details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StudentValues {
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub school_name: Option<String>,
    #[serde(default)]
    pub enrollment_status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Year-scoped student photo reference (public storage URL).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PhotoValues {
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Year-scoped exam score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExamScoreValues {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub did_not_sit: bool,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Year-scoped letter contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LetterValues {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub letter_url: Option<String>,
    #[serde(default)]
    pub sent_date: Option<String>,
}

/// Year-scoped timeline event. `event_type` only selects an icon in the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimelineEventValues {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
}
