//! Dashboard summary backing the overview charts.

use serde::Serialize;

/// Row counts for the selected academic year.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<String>,
    pub total_students: i64,
    pub sponsored_students: i64,
    pub unsponsored_students: i64,
    pub active_sponsors: i64,
    pub inactive_sponsors: i64,
    pub exams_this_year: i64,
    pub scores_recorded: i64,
    pub scores_passed: i64,
    /// Share of sat scores at or above the passing score, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_rate: Option<f64>,
}
