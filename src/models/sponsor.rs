//! Sponsor model.

use serde::{Deserialize, Serialize};

/// Sponsor lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SponsorStatus {
    Active,
    Inactive,
}

impl SponsorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SponsorStatus::Active => "active",
            SponsorStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SponsorStatus::Active),
            "inactive" => Some(SponsorStatus::Inactive),
            _ => None,
        }
    }
}

/// Which contact address receives student-update communications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateEmailChoice {
    Primary,
    Secondary,
}

impl UpdateEmailChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateEmailChoice::Primary => "primary",
            UpdateEmailChoice::Secondary => "secondary",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(UpdateEmailChoice::Primary),
            "secondary" => Some(UpdateEmailChoice::Secondary),
            _ => None,
        }
    }
}

/// A sponsor funding zero or more students.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsor {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub status: SponsorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_email_for_updates: Option<UpdateEmailChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Sponsor {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Address that receives student updates, following `primary_email_for_updates`.
    pub fn update_email(&self) -> Option<&str> {
        match self.primary_email_for_updates {
            Some(UpdateEmailChoice::Secondary) => self.secondary_email.as_deref(),
            _ => self.email.as_deref(),
        }
    }
}

/// Request body for creating a sponsor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSponsorRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub secondary_email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_status")]
    pub status: SponsorStatus,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub primary_email_for_updates: Option<UpdateEmailChoice>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_status() -> SponsorStatus {
    SponsorStatus::Active
}

/// Request body for updating an existing sponsor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSponsorRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub secondary_email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub status: Option<SponsorStatus>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub primary_email_for_updates: Option<UpdateEmailChoice>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Append-only narrative entry on a sponsor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorTimelineEvent {
    pub id: String,
    pub sponsor_id: String,
    /// Free-text tag used by the client for icon and color selection only
    pub event_type: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub event_date: String,
    pub created_at: String,
}

/// Request body for appending a sponsor timeline entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSponsorTimelineEventRequest {
    #[serde(default = "default_event_type")]
    pub event_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
}

fn default_event_type() -> String {
    "note".to_string()
}
