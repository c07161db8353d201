//! Exam and exam score models.

use serde::{Deserialize, Serialize};

use super::{ExamScoreValues, VersionedRow};

/// An exam sat during one academic year.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    pub academic_year: String,
    pub max_score: f64,
    pub passing_score: f64,
    pub created_at: String,
}

/// Request body for creating an exam.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamRequest {
    pub name: String,
    #[serde(default)]
    pub term: Option<String>,
    /// Defaults to the current academic year
    #[serde(default)]
    pub academic_year: Option<String>,
    pub max_score: f64,
    pub passing_score: f64,
}

/// Request body for updating an exam.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExamRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub passing_score: Option<f64>,
}

/// Query parameters for listing exams.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamListQuery {
    #[serde(default)]
    pub academic_year: Option<String>,
}

/// Request body for recording a student's score on an exam.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScoreRequest {
    pub student_id: String,
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub did_not_sit: bool,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// A score with its derived percentage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreView {
    pub score_id: String,
    pub student_id: String,
    pub exam_id: String,
    pub record: Option<VersionedRow<ExamScoreValues>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

impl Exam {
    /// `score / max_score` as a percentage; `None` when the student did not sit.
    pub fn percentage(&self, values: &ExamScoreValues) -> Option<f64> {
        if values.did_not_sit || self.max_score <= 0.0 {
            return None;
        }
        values.score.map(|score| score / self.max_score * 100.0)
    }

    pub fn passed(&self, values: &ExamScoreValues) -> Option<bool> {
        if values.did_not_sit {
            return None;
        }
        values.score.map(|score| score >= self.passing_score)
    }
}
