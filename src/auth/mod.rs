//! Authentication and authorization boundary.
//!
//! The PSK layer authenticates the calling service with a constant-time comparison. The actor
//! layer then resolves who the service is acting for (`x-actor-id`, a profile ID) and attaches
//! an [`Actor`] that handlers check against the role policy.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::db::Repository;
use crate::errors::{AppError, AppErrorWithRevision};
use crate::models::Role;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header naming the profile the caller acts for.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Kind of access an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Any authenticated role
    Read,
    /// Data entry: students, sponsors, exams, records
    Write,
    /// Years, settings, profiles, maintenance, audit log
    Admin,
}

/// The identity an operation runs as.
#[derive(Debug, Clone)]
pub struct Actor {
    /// Profile ID, `None` for the trusted service itself
    pub id: Option<String>,
    pub role: Role,
}

impl Actor {
    pub fn service() -> Self {
        Self {
            id: None,
            role: Role::Admin,
        }
    }

    /// Name recorded in audit entries.
    pub fn name(&self) -> &str {
        self.id.as_deref().unwrap_or("service")
    }

    /// Check the role policy. Denials carry no detail about the policy.
    pub fn authorize(&self, access: Access) -> Result<(), AppError> {
        let allowed = match access {
            Access::Read => true,
            Access::Write => matches!(self.role, Role::Admin | Role::Staff),
            Access::Admin => self.role == Role::Admin,
        };
        if allowed {
            Ok(())
        } else {
            Err(AppError::PermissionDenied("Permission denied".to_string()))
        }
    }
}

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match provided {
        Some(provided_key) => {
            if constant_time_compare(&provided_key, &expected) {
                next.run(request).await
            } else {
                unauthorized_response("Invalid API key")
            }
        }
        None => {
            // Also check Authorization header as bearer token
            let bearer = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string());

            match bearer {
                Some(bearer_key) if constant_time_compare(&bearer_key, &expected) => {
                    next.run(request).await
                }
                _ => unauthorized_response("Missing or invalid API key"),
            }
        }
    }
}

/// Resolve the acting profile and attach it to the request as an [`Actor`] extension.
pub async fn actor_layer(
    State(repo): State<Arc<Repository>>,
    mut request: Request,
    next: Next,
) -> Response {
    let actor_id = request
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let actor = match actor_id {
        None => Actor::service(),
        Some(id) => match repo.get_profile(&id).await {
            Ok(Some(profile)) => Actor {
                id: Some(profile.id),
                role: profile.role,
            },
            Ok(None) => {
                tracing::debug!("Unknown actor profile {}", id);
                return rejected(AppError::PermissionDenied("Permission denied".to_string()), &repo)
                    .await;
            }
            Err(e) => return rejected(e, &repo).await,
        },
    };

    request.extensions_mut().insert(actor);
    next.run(request).await
}

async fn rejected(error: AppError, repo: &Repository) -> Response {
    let revision_id = repo.get_revision_id().await.unwrap_or(0);
    AppErrorWithRevision { error, revision_id }.into_response()
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Reject a caller that failed the PSK check. No revision is disclosed before authentication.
fn unauthorized_response(message: &str) -> Response {
    AppErrorWithRevision {
        error: AppError::Unauthorized(message.to_string()),
        revision_id: 0,
    }
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::codes;

    fn actor(role: Role) -> Actor {
        Actor {
            id: Some("p1".to_string()),
            role,
        }
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("test-key-123", "test-key-123"));
        assert!(!constant_time_compare("test-key-123", "test-key-124"));
        assert!(!constant_time_compare("short", "much-longer-key"));
        assert!(!constant_time_compare("", "not-empty"));
    }

    #[test]
    fn test_role_policy() {
        assert!(actor(Role::Viewer).authorize(Access::Read).is_ok());
        assert!(actor(Role::Viewer).authorize(Access::Write).is_err());
        assert!(actor(Role::Staff).authorize(Access::Write).is_ok());
        assert!(actor(Role::Staff).authorize(Access::Admin).is_err());
        assert!(actor(Role::Admin).authorize(Access::Admin).is_ok());
    }

    #[test]
    fn test_service_actor_is_admin() {
        let service = Actor::service();
        assert_eq!(service.name(), "service");
        assert!(service.authorize(Access::Admin).is_ok());
    }

    #[test]
    fn test_denial_is_opaque() {
        let err = actor(Role::Viewer).authorize(Access::Admin).unwrap_err();
        assert_eq!(err.error_code(), codes::PERMISSION_DENIED);
        assert_eq!(err.message(), "Permission denied");
    }
}
