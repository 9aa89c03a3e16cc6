//! Resend HTTP API transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use courier_common::config::AppConfig;

use crate::transport::{DeliveryReceipt, OutboundEmail, Transport, TransportError};

/// Request timeout for a single Resend call.
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct ResendConfig {
    /// Without a key every delivery fails with `NotConfigured`.
    pub api_key: Option<String>,
    pub api_url: String,
    pub from: String,
}

impl ResendConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            api_key: config.resend_api_key.clone(),
            api_url: config.resend_api_url.trim_end_matches('/').to_string(),
            from: config.email_from.clone(),
        }
    }
}

pub struct ResendTransport {
    config: ResendConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResendErrorBody {
    message: String,
}

impl ResendTransport {
    pub fn new(config: ResendConfig) -> Result<Self, TransportError> {
        if config.api_key.is_none() {
            tracing::warn!("RESEND_API_KEY not set, email delivery will fail");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { config, client })
    }

    fn request_body<'a>(&'a self, email: &'a OutboundEmail) -> SendEmailRequest<'a> {
        SendEmailRequest {
            from: &self.config.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        }
    }
}

#[async_trait]
impl Transport for ResendTransport {
    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, TransportError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| TransportError::NotConfigured("RESEND_API_KEY is not set".to_string()))?;

        let response = self
            .client
            .post(format!("{}/emails", self.config.api_url))
            .bearer_auth(api_key)
            .json(&self.request_body(email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ResendErrorBody>(&raw)
                .map(|b| b.message)
                .unwrap_or(raw);
            tracing::debug!(status = status.as_u16(), %message, "Resend rejected email");
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: SendEmailResponse = response.json().await?;
        tracing::debug!(external_id = %body.id, to = %email.to, "Email accepted by Resend");

        Ok(DeliveryReceipt {
            external_id: body.id,
        })
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> ResendConfig {
        ResendConfig {
            api_key: api_key.map(String::from),
            api_url: "http://127.0.0.1:9".to_string(),
            from: "Courier <noreply@example.com>".to_string(),
        }
    }

    fn email() -> OutboundEmail {
        OutboundEmail {
            to: "rider@example.com".to_string(),
            subject: "Welcome".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let transport = ResendTransport::new(config(Some("key"))).unwrap();
        let email = email();
        let body = serde_json::to_value(transport.request_body(&email)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "from": "Courier <noreply@example.com>",
                "to": ["rider@example.com"],
                "subject": "Welcome",
                "html": "<p>Hi</p>",
                "text": "Hi"
            })
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_configured() {
        let transport = ResendTransport::new(config(None)).unwrap();
        let err = transport.deliver(&email()).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConfigured(_)));
    }
}
