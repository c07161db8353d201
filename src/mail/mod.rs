//! Outbound email used by the settings verification action.
//!
//! The transport is chosen by the `email` settings entry: SMTP through lettre, or an HTTP
//! email API that accepts `{ from, to, subject, text }` with a bearer key.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Settings key holding [`EmailSettings`].
pub const EMAIL_SETTINGS_KEY: &str = "email";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProvider {
    Smtp,
    Api,
}

impl EmailProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailProvider::Smtp => "smtp",
            EmailProvider::Api => "api",
        }
    }
}

/// Stored email configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    pub provider: EmailProvider,
    pub from_address: String,
    #[serde(default)]
    pub smtp: Option<SmtpSettings>,
    #[serde(default)]
    pub api: Option<ApiSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_tls() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSettings {
    pub endpoint: String,
    pub api_key: String,
}

/// A configured email transport.
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Api {
        client: reqwest::Client,
        endpoint: String,
        api_key: String,
        from: String,
    },
}

impl Mailer {
    /// Build the transport selected by `settings`. Missing pieces are validation errors.
    pub fn from_settings(settings: &EmailSettings) -> Result<Self, AppError> {
        let from_address = settings.from_address.trim();
        if from_address.is_empty() {
            return Err(AppError::Validation("fromAddress is required".to_string()));
        }

        match settings.provider {
            EmailProvider::Smtp => {
                let smtp = settings.smtp.as_ref().ok_or_else(|| {
                    AppError::Validation("SMTP settings are not configured".to_string())
                })?;
                if smtp.host.trim().is_empty() {
                    return Err(AppError::Validation("SMTP host is required".to_string()));
                }

                let builder = if smtp.use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host).map_err(
                        |e| AppError::Validation(format!("Invalid SMTP host: {}", e)),
                    )?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
                };
                let mut builder = builder.port(smtp.port);

                if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
                    builder =
                        builder.credentials(Credentials::new(username.clone(), password.clone()));
                }

                Ok(Mailer::Smtp {
                    transport: builder.build(),
                    from: parse_mailbox(from_address)?,
                })
            }
            EmailProvider::Api => {
                let api = settings.api.as_ref().ok_or_else(|| {
                    AppError::Validation("Email API settings are not configured".to_string())
                })?;
                if api.endpoint.trim().is_empty() || api.api_key.trim().is_empty() {
                    return Err(AppError::Validation(
                        "Email API endpoint and apiKey are required".to_string(),
                    ));
                }

                Ok(Mailer::Api {
                    client: reqwest::Client::new(),
                    endpoint: api.endpoint.clone(),
                    api_key: api.api_key.clone(),
                    from: from_address.to_string(),
                })
            }
        }
    }

    pub fn provider(&self) -> EmailProvider {
        match self {
            Mailer::Smtp { .. } => EmailProvider::Smtp,
            Mailer::Api { .. } => EmailProvider::Api,
        }
    }

    /// Send one plain-text message. Delivery failures are transient.
    pub async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), AppError> {
        match self {
            Mailer::Smtp { transport, from } => {
                let message = Message::builder()
                    .from(from.clone())
                    .to(parse_mailbox(to)?)
                    .subject(subject)
                    .header(ContentType::TEXT_PLAIN)
                    .body(text.to_string())
                    .map_err(|e| AppError::Validation(format!("Invalid message: {}", e)))?;

                transport.send(message).await.map_err(|e| {
                    tracing::warn!("SMTP delivery failed: {}", e);
                    AppError::Transient(format!("SMTP delivery failed: {}", e))
                })?;
            }
            Mailer::Api {
                client,
                endpoint,
                api_key,
                from,
            } => {
                parse_mailbox(to)?;
                let response = client
                    .post(endpoint)
                    .bearer_auth(api_key)
                    .json(&serde_json::json!({
                        "from": from,
                        "to": to,
                        "subject": subject,
                        "text": text,
                    }))
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let status = response.status();
                    tracing::warn!("Email API rejected message: {}", status);
                    return Err(AppError::Transient(format!(
                        "Email API returned {}",
                        status
                    )));
                }
            }
        }

        tracing::info!("Test email sent to {} via {}", to, self.provider().as_str());
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, AppError> {
    address
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid email address: {}", address)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn mock_api(status: axum::http::StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/send",
                post(
                    move |State(captured): State<Captured>,
                          headers: HeaderMap,
                          Json(body): Json<serde_json::Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(|s| s.to_string());
                        captured.lock().unwrap().push((auth, body));
                        status
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/send", addr), captured)
    }

    fn api_settings(endpoint: &str) -> EmailSettings {
        EmailSettings {
            provider: EmailProvider::Api,
            from_address: "office@example.org".to_string(),
            smtp: None,
            api: Some(ApiSettings {
                endpoint: endpoint.to_string(),
                api_key: "secret".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_api_mailer_posts_message() {
        let (endpoint, captured) = mock_api(axum::http::StatusCode::OK).await;
        let mailer = Mailer::from_settings(&api_settings(&endpoint)).unwrap();

        mailer
            .send("grace@example.org", "Test", "Hello")
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0.as_deref(), Some("Bearer secret"));
        assert_eq!(captured[0].1["to"], "grace@example.org");
        assert_eq!(captured[0].1["from"], "office@example.org");
    }

    #[tokio::test]
    async fn test_api_rejection_is_transient() {
        let (endpoint, _captured) = mock_api(axum::http::StatusCode::BAD_GATEWAY).await;
        let mailer = Mailer::from_settings(&api_settings(&endpoint)).unwrap();

        let err = mailer
            .send("grace@example.org", "Test", "Hello")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transient(_)));
    }

    #[test]
    fn test_missing_provider_settings_are_validation_errors() {
        let settings = EmailSettings {
            provider: EmailProvider::Smtp,
            from_address: "office@example.org".to_string(),
            smtp: None,
            api: None,
        };
        assert!(matches!(
            Mailer::from_settings(&settings),
            Err(AppError::Validation(_))
        ));

        let mut settings = api_settings("http://localhost/send");
        settings.from_address = " ".to_string();
        assert!(matches!(
            Mailer::from_settings(&settings),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_smtp_mailer_builds_without_connecting() {
        let settings = EmailSettings {
            provider: EmailProvider::Smtp,
            from_address: "Office <office@example.org>".to_string(),
            smtp: Some(SmtpSettings {
                host: "smtp.example.org".to_string(),
                port: 2525,
                username: Some("office".to_string()),
                password: Some("pw".to_string()),
                use_tls: false,
            }),
            api: None,
        };
        let mailer = Mailer::from_settings(&settings).unwrap();
        assert_eq!(mailer.provider(), EmailProvider::Smtp);
    }
}
