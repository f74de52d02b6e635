//! Email delivery seam for one-time code messages.
//!
//! `send-code` builds an [`EmailMessage`] and hands it to the configured
//! [`EmailSender`] inside the request, bounded by a timeout. The code row
//! is persisted before delivery is attempted, so a transport failure is
//! reported as a hard error without losing the issued code.
//!
//! The default sender for local dev is [`LogEmailSender`], which logs and
//! returns `Ok(())`. Production deployments point [`HttpEmailSender`] at a
//! provider webhook.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::info;
use url::Url;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to surface the failure.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

/// Sender that posts messages to an HTTP email provider.
pub struct HttpEmailSender {
    client: Client,
    endpoint: Url,
    api_key: Option<SecretString>,
}

impl HttpEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: Url, api_key: Option<SecretString>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("failed to build email HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let mut request = self.client.post(self.endpoint.clone()).json(&json!({
            "to": message.to_email,
            "template": message.template,
            "payload": message.payload_json,
        }));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .context("email provider request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("email provider returned {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EmailMessage, EmailSender, HttpEmailSender, LogEmailSender};
    use anyhow::Result;
    use url::Url;

    fn message() -> EmailMessage {
        EmailMessage {
            to_email: "desk@clinic.org".to_string(),
            template: "two_fa_code".to_string(),
            payload_json: r#"{"code":"123456"}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() -> Result<()> {
        LogEmailSender.send(&message()).await
    }

    #[test]
    fn http_sender_builds_with_and_without_key() -> Result<()> {
        let endpoint = Url::parse("https://mail.clinic.org/v1/send")?;
        let sender = HttpEmailSender::new(endpoint.clone(), None)?;
        assert!(sender.api_key.is_none());

        let sender = HttpEmailSender::new(endpoint, Some("key".to_string().into()))?;
        assert!(sender.api_key.is_some());
        Ok(())
    }
}
