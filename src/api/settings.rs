//! Organization settings endpoints, including the email verification send.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{error, require_text, success, written, ApiResult};
use crate::audit;
use crate::auth::{Access, Actor};
use crate::errors::AppError;
use crate::mail::{EmailSettings, Mailer, EMAIL_SETTINGS_KEY};
use crate::models::{PutSettingRequest, Setting, TestEmailRequest, TestEmailResult};
use crate::AppState;

const TEST_EMAIL_SUBJECT: &str = "Sponsorship office test email";
const TEST_EMAIL_BODY: &str =
    "This message confirms that outgoing email is configured correctly.";

/// GET /api/settings
pub async fn list_settings(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<Setting>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }

    match state.repo.list_settings().await {
        Ok(settings) => success(settings, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/settings/{key}
pub async fn put_setting(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(key): Path<String>,
    Json(request): Json<PutSettingRequest>,
) -> ApiResult<Setting> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = actor.authorize(Access::Admin) {
        return error(e, revision_id);
    }
    if key == EMAIL_SETTINGS_KEY {
        if let Err(e) = serde_json::from_value::<EmailSettings>(request.value.clone()) {
            return error(
                AppError::Validation(format!("Invalid email settings: {}", e)),
                revision_id,
            );
        }
    }

    let result = state.repo.put_setting(&key, &request.value).await;
    if result.is_ok() {
        audit::record(state.repo.pool(), actor.name(), "update", "setting", Some(&key), None)
            .await;
    }
    written(&state, revision_id, result).await
}

/// POST /api/settings/email/test - Send one message through the configured transport.
pub async fn send_test_email(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<TestEmailRequest>,
) -> ApiResult<TestEmailResult> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        actor.authorize(Access::Admin)?;
        require_text(&request.to, "to")?;

        let setting = state
            .repo
            .get_setting(EMAIL_SETTINGS_KEY)
            .await?
            .ok_or_else(|| AppError::Validation("Email settings are not configured".to_string()))?;
        let settings: EmailSettings = serde_json::from_value(setting.value)
            .map_err(|e| AppError::Validation(format!("Invalid email settings: {}", e)))?;

        let mailer = Mailer::from_settings(&settings)?;
        mailer
            .send(&request.to, TEST_EMAIL_SUBJECT, TEST_EMAIL_BODY)
            .await?;

        Ok::<_, AppError>(TestEmailResult {
            provider: mailer.provider().as_str().to_string(),
            delivered_to: request.to.trim().to_string(),
        })
    }
    .await;

    match result {
        Ok(sent) => success(sent, revision_id),
        Err(e) => error(e, revision_id),
    }
}
