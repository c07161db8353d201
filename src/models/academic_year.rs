//! Academic year model.

use serde::{Deserialize, Serialize};

/// An organizational reporting period; at most one is flagged current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub year_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub is_current: bool,
    pub created_at: String,
}

/// Request body for creating an academic year.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAcademicYearRequest {
    pub year_name: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    /// Make the new year the current one immediately
    #[serde(default)]
    pub is_current: bool,
}

/// Request body for updating an academic year's name or dates.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAcademicYearRequest {
    #[serde(default)]
    pub year_name: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Query parameters for the cross-year warning endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossYearWarningQuery {
    #[serde(default)]
    pub record_year: Option<String>,
}

/// Cross-year advisory; `warning` is null when the record belongs to the selected year.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossYearWarning {
    pub warning: Option<String>,
}
