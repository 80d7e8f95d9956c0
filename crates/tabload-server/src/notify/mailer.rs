//! Mail delivery port and HTTP adapter
//!
//! The transactional mail provider is driven through a JSON API in the
//! SendGrid shape: `POST /v3/mail/send` with a bearer token, `202` on
//! acceptance. Delivery failures surface as errors here; swallowing them is
//! the [`Notifier`](super::Notifier)'s job, not the adapter's.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tabload_common::{PipelineError, Result};
use tracing::debug;

/// Per-request timeout for mail API calls.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// A composed HTML email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Collaborator port for the mail provider.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, api_key: &str, message: &EmailMessage) -> Result<()>;
}

/// HTTP-backed [`Mailer`] implementation.
pub struct HttpMailer {
    client: Client,
    base_url: String,
}

impl HttpMailer {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("tabload/0.1")
            .build()
            .map_err(|e| PipelineError::Unexpected(format!("http client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("MAIL_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.sendgrid.com".to_string());
        Self::new(base_url)
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, api_key: &str, message: &EmailMessage) -> Result<()> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": message.from },
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.html_body }],
        });

        let url = format!("{}/v3/mail/send", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Network(format!("mail request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Unexpected(format!(
                "mail provider rejected message ({}): {}",
                status, text
            )));
        }

        debug!(to = %message.to, subject = %message.subject, "Email accepted by provider");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> EmailMessage {
        EmailMessage {
            from: "noreply@example.com".to_string(),
            to: "a@b.com".to_string(),
            subject: "Data Load Success - analytics.sales".to_string(),
            html_body: "<html><body>done</body></html>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_posts_sendgrid_payload() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "personalizations": [{ "to": [{ "email": "a@b.com" }] }],
                "from": { "email": "noreply@example.com" },
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri()).unwrap();
        mailer.send("test-key", &message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_surfaces_provider_rejection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri()).unwrap();
        let result = mailer.send("wrong-key", &message()).await;
        assert!(matches!(result, Err(PipelineError::Unexpected(_))));
    }
}
