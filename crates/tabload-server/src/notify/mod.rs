//! Status notification
//!
//! [`Notifier::notify`] must never propagate an error: a notification
//! failure cannot be allowed to mask the run's real outcome or crash the
//! triggering invocation, which would make the host re-deliver the event
//! and reprocess data the warehouse already accepted. Every failure in here
//! is logged and swallowed.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::secrets::{DeliveryCredentials, SecretStore};

pub mod mailer;

pub use mailer::{EmailMessage, HttpMailer, Mailer};

/// Email notifier with lazily-loaded delivery credentials.
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    secrets: Arc<dyn SecretStore>,
    enabled: bool,
    credentials: OnceCell<Option<DeliveryCredentials>>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, secrets: Arc<dyn SecretStore>, enabled: bool) -> Self {
        Self {
            mailer,
            secrets,
            enabled,
            credentials: OnceCell::new(),
        }
    }

    /// Send a status email. Never returns an error: delivery problems,
    /// missing credentials, and missing recipients all degrade to log lines.
    pub async fn notify(&self, recipient: Option<&str>, subject: &str, html_body: &str) {
        if !self.enabled {
            info!(subject = %subject, "Email notifications disabled, skipping send");
            return;
        }

        let Some(credentials) = self.credentials().await else {
            return;
        };

        let to = match recipient {
            Some(address) if !address.is_empty() => address,
            _ => {
                if credentials.from_address.is_empty() {
                    warn!(subject = %subject, "No recipient available, skipping notification");
                    return;
                }
                credentials.from_address.as_str()
            },
        };

        let message = EmailMessage {
            from: credentials.from_address.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        };

        match self.mailer.send(&credentials.api_key, &message).await {
            Ok(()) => info!(to = %message.to, subject = %subject, "Notification sent"),
            Err(e) => error!(error = %e, to = %message.to, "Failed to send notification"),
        }
    }

    /// Load credentials at most once per process. A load failure is logged
    /// and cached as `None` so subsequent runs do not retry the secret store
    /// on every notification.
    async fn credentials(&self) -> Option<&DeliveryCredentials> {
        self.credentials
            .get_or_init(|| async {
                match DeliveryCredentials::load(self.secrets.as_ref()).await {
                    Ok(credentials) => Some(credentials),
                    Err(e) => {
                        error!(error = %e, "Failed to load mail delivery credentials");
                        None
                    },
                }
            })
            .await
            .as_ref()
    }
}

/// Compose the success notification.
pub fn success_email(
    table: &str,
    csv_uri: &str,
    config_key: &str,
    rows_loaded: u64,
) -> (String, String) {
    let subject = format!("Data Load Success - {}", table);
    let body = format!(
        "<html>\n\
         <body>\n\
         <h2>Data Load Completed Successfully</h2>\n\
         <p><strong>Table:</strong> {}</p>\n\
         <p><strong>Rows Loaded:</strong> {}</p>\n\
         <p><strong>CSV File Path:</strong> {}</p>\n\
         <p><strong>Config File:</strong> {}</p>\n\
         <p><strong>Completed At:</strong> {}</p>\n\
         </body>\n\
         </html>",
        table,
        rows_loaded,
        csv_uri,
        config_key,
        chrono::Utc::now().to_rfc3339()
    );
    (subject, body)
}

/// Compose the failure notification. Fields that the run never reached are
/// rendered as "unknown" rather than omitted, so the branch taken is visible
/// in the email itself.
pub fn failure_email(
    error_kind: &str,
    error_message: &str,
    table: Option<&str>,
    csv_uri: Option<&str>,
    config_key: &str,
) -> (String, String) {
    let target = table.unwrap_or("unknown");
    let subject = format!("Data Load Failed - {}", target);
    let body = format!(
        "<html>\n\
         <body>\n\
         <h2>Data Load Failed</h2>\n\
         <p><strong>Error Type:</strong> {}</p>\n\
         <p><strong>Table:</strong> {}</p>\n\
         <p><strong>CSV File Path:</strong> {}</p>\n\
         <p><strong>Config File:</strong> {}</p>\n\
         <p><strong>Error:</strong> {}</p>\n\
         <p><strong>Failed At:</strong> {}</p>\n\
         <p>Please check the service logs for more details.</p>\n\
         </body>\n\
         </html>",
        error_kind,
        target,
        csv_uri.unwrap_or("unknown"),
        config_key,
        error_message,
        chrono::Utc::now().to_rfc3339()
    );
    (subject, body)
}

/// Compose the "load succeeded but archival failed" warning. Distinct from
/// the failure notification: the table has the data and the run still
/// reports success, but the source files were left in place.
pub fn archive_warning_email(
    table: &str,
    csv_uri: &str,
    config_key: &str,
    error_message: &str,
) -> (String, String) {
    let subject = format!("Data Load Succeeded, Cleanup Failed - {}", table);
    let body = format!(
        "<html>\n\
         <body>\n\
         <h2>Data Load Succeeded, But Archival Failed</h2>\n\
         <p>The table was loaded successfully; the source files could not be \
         moved to the processed folder and may trigger reprocessing.</p>\n\
         <p><strong>Table:</strong> {}</p>\n\
         <p><strong>CSV File Path:</strong> {}</p>\n\
         <p><strong>Config File:</strong> {}</p>\n\
         <p><strong>Error:</strong> {}</p>\n\
         </body>\n\
         </html>",
        table, csv_uri, config_key, error_message
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tabload_common::{PipelineError, Result};

    struct RecordingMailer {
        sent: Mutex<Vec<EmailMessage>>,
        fail: bool,
    }

    impl RecordingMailer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, _api_key: &str, message: &EmailMessage) -> Result<()> {
            if self.fail {
                return Err(PipelineError::Network("provider down".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FixedSecrets;

    #[async_trait]
    impl crate::secrets::SecretStore for FixedSecrets {
        async fn get(&self, name: &str) -> Result<String> {
            match name {
                crate::secrets::MAIL_API_KEY => Ok("key".to_string()),
                crate::secrets::MAIL_FROM_ADDRESS => Ok("noreply@example.com".to_string()),
                other => Err(PipelineError::Secret(format!("unknown secret {}", other))),
            }
        }
    }

    struct FailingSecrets;

    #[async_trait]
    impl crate::secrets::SecretStore for FailingSecrets {
        async fn get(&self, name: &str) -> Result<String> {
            Err(PipelineError::Secret(format!("{} unavailable", name)))
        }
    }

    #[tokio::test]
    async fn test_notify_sends_to_explicit_recipient() {
        let mailer = RecordingMailer::new(false);
        let notifier = Notifier::new(mailer.clone(), Arc::new(FixedSecrets), true);

        notifier.notify(Some("a@b.com"), "subject", "<html></html>").await;

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@b.com");
        assert_eq!(sent[0].from, "noreply@example.com");
    }

    #[tokio::test]
    async fn test_notify_falls_back_to_sender_address() {
        let mailer = RecordingMailer::new(false);
        let notifier = Notifier::new(mailer.clone(), Arc::new(FixedSecrets), true);

        notifier.notify(None, "subject", "<html></html>").await;

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "noreply@example.com");
    }

    #[tokio::test]
    async fn test_notify_never_raises_on_delivery_failure() {
        let mailer = RecordingMailer::new(true);
        let notifier = Notifier::new(mailer, Arc::new(FixedSecrets), true);

        // Returns normally; the failure is only logged.
        notifier.notify(Some("a@b.com"), "subject", "<html></html>").await;
    }

    #[tokio::test]
    async fn test_notify_swallows_credential_failure() {
        let mailer = RecordingMailer::new(false);
        let notifier = Notifier::new(mailer.clone(), Arc::new(FailingSecrets), true);

        notifier.notify(Some("a@b.com"), "subject", "<html></html>").await;

        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notify_disabled_is_a_no_op() {
        let mailer = RecordingMailer::new(false);
        let notifier = Notifier::new(mailer.clone(), Arc::new(FixedSecrets), false);

        notifier.notify(Some("a@b.com"), "subject", "<html></html>").await;

        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failure_email_renders_unknown_fields() {
        let (subject, body) = failure_email("Config Validation", "dataset is required", None, None, "in/sales_config.json");
        assert_eq!(subject, "Data Load Failed - unknown");
        assert!(body.contains("dataset is required"));
        assert!(body.contains("in/sales_config.json"));
    }
}
