//! Notification gateway boundary
//!
//! The engine hands the gateway structured data (template name plus JSON
//! data) and never renders message content itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Header carrying the keyed BLAKE3 signature of an HTTP request body
pub const SIGNATURE_HEADER: &str = "x-booking-signature";

const SIGNING_CONTEXT: &str = "booking-engine notification-gateway v1 request signature";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification has no recipient")]
    MissingRecipient,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("gateway rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub type NotificationResult<T> = Result<T, NotificationError>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub template: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsMessage {
    pub to: String,
    pub template: String,
    #[serde(default)]
    pub data: Value,
}

/// A single outbound notification planned by a workflow step
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Email(EmailMessage),
    Sms(SmsMessage),
}

impl Notification {
    pub fn email(to: impl Into<String>, subject: impl Into<String>, template: &str, data: Value) -> Self {
        Notification::Email(EmailMessage {
            to: to.into(),
            subject: subject.into(),
            template: template.to_string(),
            data,
        })
    }

    pub fn sms(to: impl Into<String>, template: &str, data: Value) -> Self {
        Notification::Sms(SmsMessage {
            to: to.into(),
            template: template.to_string(),
            data,
        })
    }

    pub fn recipient(&self) -> &str {
        match self {
            Notification::Email(m) => &m.to,
            Notification::Sms(m) => &m.to,
        }
    }

    pub fn template(&self) -> &str {
        match self {
            Notification::Email(m) => &m.template,
            Notification::Sms(m) => &m.template,
        }
    }

    pub fn channel(&self) -> &'static str {
        match self {
            Notification::Email(_) => "email",
            Notification::Sms(_) => "sms",
        }
    }
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> NotificationResult<()>;

    async fn send_sms(&self, message: &SmsMessage) -> NotificationResult<()>;

    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        if notification.recipient().trim().is_empty() {
            return Err(NotificationError::MissingRecipient);
        }
        match notification {
            Notification::Email(m) => self.send_email(m).await,
            Notification::Sms(m) => self.send_sms(m).await,
        }
    }
}

// ── Log gateway ──────────────────────────────────────────────────────

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogNotificationGateway;

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn send_email(&self, message: &EmailMessage) -> NotificationResult<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            template = %message.template,
            "Email notification"
        );
        Ok(())
    }

    async fn send_sms(&self, message: &SmsMessage) -> NotificationResult<()> {
        tracing::info!(to = %message.to, template = %message.template, "SMS notification");
        Ok(())
    }
}

// ── HTTP gateway ─────────────────────────────────────────────────────

/// Delivers notifications to a remote gateway over HTTP.
///
/// Every request body is signed with a BLAKE3 keyed hash; the key is derived
/// from the shared secret so the secret itself never goes over the wire.
pub struct HttpNotificationGateway {
    client: reqwest::Client,
    base_url: String,
    signing_key: [u8; 32],
}

impl HttpNotificationGateway {
    pub fn new(endpoint: &str, shared_secret: &str, timeout: Duration) -> NotificationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            signing_key: derive_signing_key(shared_secret),
        })
    }

    pub fn sign(&self, body: &[u8]) -> String {
        sign_body(&self.signing_key, body)
    }

    async fn post<T: Serialize>(&self, path: &str, message: &T) -> NotificationResult<()> {
        let body =
            serde_json::to_vec(message).map_err(|e| NotificationError::Transport(e.to_string()))?;
        let signature = self.sign(&body);

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotificationError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl NotificationGateway for HttpNotificationGateway {
    async fn send_email(&self, message: &EmailMessage) -> NotificationResult<()> {
        self.post("/email", message).await
    }

    async fn send_sms(&self, message: &SmsMessage) -> NotificationResult<()> {
        self.post("/sms", message).await
    }
}

impl std::fmt::Debug for HttpNotificationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpNotificationGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

pub fn derive_signing_key(shared_secret: &str) -> [u8; 32] {
    blake3::derive_key(SIGNING_CONTEXT, shared_secret.as_bytes())
}

/// Hex-encoded keyed hash of `body`
pub fn sign_body(key: &[u8; 32], body: &[u8]) -> String {
    blake3::keyed_hash(key, body).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_is_stable_and_keyed() {
        let key = derive_signing_key("s3cret");
        let body = br#"{"to":"a@example.com"}"#;

        assert_eq!(sign_body(&key, body), sign_body(&key, body));
        assert_eq!(sign_body(&key, body).len(), 64);
        assert_ne!(
            sign_body(&key, body),
            sign_body(&derive_signing_key("other"), body)
        );
        assert_ne!(sign_body(&key, body), sign_body(&key, b"{}"));
    }

    #[test]
    fn test_notification_accessors() {
        let n = Notification::email("a@example.com", "Hi", "booking-requested", json!({}));
        assert_eq!(n.channel(), "email");
        assert_eq!(n.recipient(), "a@example.com");
        assert_eq!(n.template(), "booking-requested");

        let s = Notification::sms("+15550001", "reminder-hour", json!({"slot": "x"}));
        assert_eq!(s.channel(), "sms");
    }

    #[tokio::test]
    async fn test_blank_recipient_is_rejected() {
        let gateway = LogNotificationGateway;
        let n = Notification::sms("  ", "reminder-hour", Value::Null);
        assert_eq!(
            gateway.send(&n).await,
            Err(NotificationError::MissingRecipient)
        );
        assert!(gateway
            .send(&Notification::sms("+15550001", "reminder-hour", Value::Null))
            .await
            .is_ok());
    }

    #[test]
    fn test_email_serializes_camel_case() {
        let m = EmailMessage {
            to: "a@example.com".into(),
            subject: "Booking confirmed".into(),
            template: "booking-approved".into(),
            data: json!({"listing": "Tasting"}),
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["template"], "booking-approved");
        assert_eq!(v["data"]["listing"], "Tasting");
    }
}
