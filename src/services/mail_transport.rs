use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::{Config, MailTransportKind};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Delivers one rendered message. Implementations must not retry; the outbox
/// worker owns retries and backoff.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// Writes the message to the log instead of sending it. Used in development.
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail delivered to log transport");
        Ok(())
    }
}

/// Posts JSON to a transactional mail API.
pub struct HttpMailTransport {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpMailTransport {
    pub fn new(client: Client, api_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let mut request = self.client.post(&self.api_url).json(mail);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ServiceUnavailable(format!(
                "Mail API responded with {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }
}

/// Selects the transport named by `MAIL_TRANSPORT`.
pub fn from_config(config: &Config, client: Client) -> Result<Arc<dyn MailTransport>> {
    match config.mail_transport {
        MailTransportKind::Log => Ok(Arc::new(LogMailTransport)),
        MailTransportKind::Http => {
            let url = config
                .mail_api_url
                .clone()
                .ok_or_else(|| Error::Config("MAIL_API_URL is required for MAIL_TRANSPORT=http".into()))?;
            Ok(Arc::new(HttpMailTransport::new(
                client,
                url,
                config.mail_api_key.clone(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_transport_always_succeeds() {
        let mail = OutgoingMail {
            from: "noreply@vantahire.com".into(),
            to: "ada@example.com".into(),
            subject: "Hello".into(),
            text: "Body".into(),
        };
        assert!(LogMailTransport.send(&mail).await.is_ok());
    }
}
