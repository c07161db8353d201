//! Organization settings model.

use serde::{Deserialize, Serialize};

/// A single settings entry; values are free-form JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: String,
}

/// Request body for storing a settings value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutSettingRequest {
    pub value: serde_json::Value,
}

/// Request body for the email verification action.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEmailRequest {
    pub to: String,
}

/// Result of a verification send.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEmailResult {
    pub provider: String,
    pub delivered_to: String,
}
