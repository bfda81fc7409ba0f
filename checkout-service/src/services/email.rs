//! Transactional email providers.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, response::Response as SmtpResponse},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::config::{SendGridConfig, SmtpConfig};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Email provider timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    /// Provider answered with a non-success status.
    #[error("Provider rejected email ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Send error: {0}")]
    SendFailed(String),
}

impl EmailError {
    /// Failures worth one more attempt: timeouts, connection drops,
    /// throttling and provider-side 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            EmailError::Timeout | EmailError::Connection(_) => true,
            EmailError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for EmailError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmailError::Timeout
        } else if err.is_connect() {
            EmailError::Connection(err.to_string())
        } else {
            EmailError::SendFailed(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailReceipt {
    pub message_id: Option<String>,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<EmailReceipt, EmailError>;

    fn name(&self) -> &'static str;
}

/// SendGrid v3 mail-send API.
pub struct SendGridProvider {
    client: Client,
    config: SendGridConfig,
}

#[derive(Serialize)]
struct SendGridRequest<'a> {
    personalizations: [SendGridPersonalization<'a>; 1],
    from: SendGridAddress<'a>,
    subject: &'a str,
    content: [SendGridContent<'a>; 1],
}

#[derive(Serialize)]
struct SendGridPersonalization<'a> {
    to: [SendGridAddress<'a>; 1],
}

#[derive(Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

impl SendGridProvider {
    pub fn new(config: SendGridConfig, timeout: Duration) -> Result<Self, EmailError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(EmailError::Configuration(
                "SENDGRID_API_KEY is not set".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmailError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    async fn send(&self, email: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        let request = SendGridRequest {
            personalizations: [SendGridPersonalization {
                to: [SendGridAddress {
                    email: &email.to,
                    name: None,
                }],
            }],
            from: SendGridAddress {
                email: &email.from_email,
                name: Some(&email.from_name),
            },
            subject: &email.subject,
            content: [SendGridContent {
                content_type: "text/html",
                value: &email.html_body,
            }],
        };

        let url = format!(
            "{}/v3/mail/send",
            self.config.api_base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent via SendGrid");
        Ok(EmailReceipt { message_id })
    }

    fn name(&self) -> &'static str {
        "sendgrid"
    }
}

/// SMTP relay via lettre.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpProvider {
    pub fn new(config: &SmtpConfig, timeout: Duration) -> Result<Self, EmailError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| EmailError::Configuration(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(timeout))
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, email: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        let from: Mailbox = format!("{} <{}>", email.from_name, email.from_email)
            .parse()
            .map_err(|e| EmailError::Configuration(format!("Invalid from address: {}", e)))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| EmailError::InvalidRecipient(format!("{}: {}", email.to, e)))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| EmailError::SendFailed(format!("Failed to build message: {}", e)))?;

        let response = self.transport.send(message).await.map_err(|e| {
            if e.is_transient() {
                EmailError::Connection(e.to_string())
            } else {
                EmailError::SendFailed(e.to_string())
            }
        })?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent via SMTP");
        Ok(smtp_receipt(&response))
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// The relay's first reply line, e.g. `2.0.0 Ok: queued as 4F1A2`.
fn smtp_receipt(response: &SmtpResponse) -> EmailReceipt {
    let message_id = response.message().next().map(str::to_string);
    EmailReceipt { message_id }
}

enum FailureMode {
    Permanent,
    /// Fail with a 503 this many more times, then succeed.
    Transient(AtomicU64),
}

/// Records messages instead of sending them. Can be told to fail for
/// messages whose subject or body contains a pattern.
#[derive(Default)]
pub struct MockEmailProvider {
    send_count: AtomicU64,
    sent: Mutex<Vec<EmailMessage>>,
    failures: Mutex<Vec<(String, FailureMode)>>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every matching message.
    pub fn fail_when_contains(self, pattern: &str) -> Self {
        self.push_failure(pattern, FailureMode::Permanent);
        self
    }

    /// Answer 503 `times` times for matching messages, then deliver.
    pub fn fail_transiently(self, pattern: &str, times: u64) -> Self {
        self.push_failure(pattern, FailureMode::Transient(AtomicU64::new(times)));
        self
    }

    fn push_failure(&self, pattern: &str, mode: FailureMode) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((pattern.to_string(), mode));
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, email: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        {
            let failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
            for (pattern, mode) in failures.iter() {
                let pattern = pattern.as_str();
                if !email.subject.contains(pattern) && !email.html_body.contains(pattern) {
                    continue;
                }
                match mode {
                    FailureMode::Permanent => {
                        return Err(EmailError::Rejected {
                            status: 400,
                            body: "mock rejection".to_string(),
                        });
                    }
                    FailureMode::Transient(remaining) => {
                        let left = remaining.load(Ordering::SeqCst);
                        if left > 0 {
                            remaining.store(left - 1, Ordering::SeqCst);
                            return Err(EmailError::Rejected {
                                status: 503,
                                body: "mock outage".to_string(),
                            });
                        }
                    }
                }
            }
        }

        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(email.clone());

        tracing::info!(to = %email.to, subject = %email.subject, "[MOCK] Email would be sent");

        Ok(EmailReceipt {
            message_id: Some(format!("mock-email-{}", count)),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn smtp_receipt_uses_first_reply_line() {
        use lettre::transport::smtp::response::{Category, Code, Detail, Severity};

        let response = SmtpResponse::new(
            Code::new(Severity::PositiveCompletion, Category::MailSystem, Detail::Zero),
            vec![
                "2.0.0 Ok: queued as 4F1A2".to_string(),
                "trailing".to_string(),
            ],
        );

        let receipt = smtp_receipt(&response);
        assert_eq!(receipt.message_id.as_deref(), Some("2.0.0 Ok: queued as 4F1A2"));
    }

    fn message(subject: &str) -> EmailMessage {
        EmailMessage {
            to: "asha@example.com".into(),
            subject: subject.into(),
            html_body: "<p>hi</p>".into(),
            from_email: "billing@downdating.in".into(),
            from_name: "DownDating".into(),
        }
    }

    #[test]
    fn transient_classification() {
        assert!(EmailError::Timeout.is_transient());
        assert!(EmailError::Rejected { status: 503, body: String::new() }.is_transient());
        assert!(EmailError::Rejected { status: 429, body: String::new() }.is_transient());
        assert!(!EmailError::Rejected { status: 400, body: String::new() }.is_transient());
        assert!(!EmailError::InvalidRecipient("x".into()).is_transient());
    }

    #[tokio::test]
    async fn mock_fails_only_matching_subjects() {
        let provider = MockEmailProvider::new().fail_when_contains("Gold");

        assert!(provider.send(&message("Invoice for Basic")).await.is_ok());
        assert!(provider.send(&message("Invoice for Gold")).await.is_err());
        assert_eq!(provider.send_count(), 1);
    }

    #[tokio::test]
    async fn mock_transient_failure_clears() {
        let provider = MockEmailProvider::new().fail_transiently("Basic", 1);

        let first = provider.send(&message("Invoice for Basic")).await.unwrap_err();
        assert!(first.is_transient());
        assert!(provider.send(&message("Invoice for Basic")).await.is_ok());
    }

    #[tokio::test]
    async fn sendgrid_returns_message_id_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer SG.test"))
            .respond_with(ResponseTemplate::new(202).insert_header("x-message-id", "msg-123"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = SendGridProvider::new(
            SendGridConfig {
                api_key: Secret::new("SG.test".into()),
                api_base_url: server.uri(),
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let receipt = provider.send(&message("Invoice")).await.unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("msg-123"));
    }

    #[tokio::test]
    async fn sendgrid_non_success_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let provider = SendGridProvider::new(
            SendGridConfig {
                api_key: Secret::new("SG.test".into()),
                api_base_url: server.uri(),
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let err = provider.send(&message("Invoice")).await.unwrap_err();
        assert!(matches!(err, EmailError::Rejected { status: 500, .. }));
        assert!(err.is_transient());
    }
}
