//! Email relay client.

use async_trait::async_trait;
use serde::Serialize;
use tracing::instrument;

use kindred_core::EmailConfig;

use crate::error::EmailError;

const SEND_PATH: &str = "/api/v1.0/email/send";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub body: String,
}

/// Something that can deliver an `Email` to the configured recipient.
#[async_trait]
pub trait EmailRelay: Send + Sync {
    /// `Ok(true)` when the relay accepted the message, `Ok(false)` when it
    /// answered but refused.
    ///
    /// # Errors
    /// Returns `Err` only if the relay could not be reached.
    async fn send_email(&self, email: &Email) -> Result<bool, EmailError>;
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: TemplateParams<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateParams<'a> {
    to_email: &'a str,
    subject: &'a str,
    message: &'a str,
}

/// EmailJS REST API.
pub struct EmailJsRelay {
    client: reqwest::Client,
    endpoint: String,
    service_id: String,
    template_id: String,
    public_key: String,
    to_email: String,
}

impl EmailJsRelay {
    /// # Errors
    /// `NotConfigured` naming the first missing credential.
    pub fn from_config(client: reqwest::Client, config: &EmailConfig) -> Result<Self, EmailError> {
        let required = [
            ("email.service_id", &config.service_id),
            ("email.template_id", &config.template_id),
            ("email.public_key", &config.public_key),
            ("email.to_email", &config.to_email),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(EmailError::NotConfigured((*field).to_string()));
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            service_id: config.service_id.clone(),
            template_id: config.template_id.clone(),
            public_key: config.public_key.clone(),
            to_email: config.to_email.clone(),
        })
    }

    pub fn recipient(&self) -> &str {
        &self.to_email
    }
}

#[async_trait]
impl EmailRelay for EmailJsRelay {
    #[instrument(skip(self, email), fields(subject = %email.subject), level = "info")]
    async fn send_email(&self, email: &Email) -> Result<bool, EmailError> {
        let url = format!("{}{}", self.endpoint, SEND_PATH);
        let request = SendRequest {
            service_id: &self.service_id,
            template_id: &self.template_id,
            user_id: &self.public_key,
            template_params: TemplateParams {
                to_email: &self.to_email,
                subject: &email.subject,
                message: &email.body,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            tracing::info!("Email sent");
            return Ok(true);
        }

        let text = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), %text, "Email relay refused the message");
        Ok(false)
    }
}
