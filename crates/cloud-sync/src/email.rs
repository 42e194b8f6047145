//! Email alert delivery over SMTPS
//!
//! Sends the alert to every recipient with the evidence snapshot attached.
//! A snapshot that cannot be read is left out and the mail still goes.

use crate::CloudError;
use alerting::{AlertError, Notification, Notifier};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// SMTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// SMTP server host (implicit TLS)
    pub smtp_server: String,
    pub smtp_port: u16,
    /// Login, usually the sender address
    pub username: String,
    /// Password or app password
    pub password: String,
    /// Sender address; `username` when unset
    pub from: Option<String>,
    /// SMTP command timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            username: String::new(),
            password: String::new(),
            from: None,
            timeout_secs: 30,
        }
    }
}

/// SMTP alert sender
pub struct EmailNotifier {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    /// Build the SMTPS transport; no connection is made until the first send
    pub fn new(config: EmailConfig) -> Result<Self, CloudError> {
        if config.smtp_server.is_empty() {
            return Err(CloudError::Connection("smtp_server is empty".into()));
        }

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)
            .map_err(|e| CloudError::Connection(format!("{}: {}", config.smtp_server, e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(config.timeout_secs.max(1))))
            .build();

        Ok(Self { config, transport })
    }

    fn sender(&self) -> Result<Mailbox, CloudError> {
        let from = self.config.from.as_deref().unwrap_or(&self.config.username);
        from.parse::<Mailbox>()
            .map_err(|e| CloudError::Message(format!("sender {:?}: {}", from, e)))
    }

    /// Build the mail for a notification
    pub fn build_message(&self, notification: &Notification) -> Result<Message, CloudError> {
        if notification.recipients.is_empty() {
            return Err(CloudError::Message("no recipients".into()));
        }

        let mut builder = Message::builder()
            .from(self.sender()?)
            .subject(notification.subject.clone());
        for recipient in &notification.recipients {
            let mailbox = recipient
                .parse::<Mailbox>()
                .map_err(|e| CloudError::Message(format!("recipient {:?}: {}", recipient, e)))?;
            builder = builder.to(mailbox);
        }

        let mut body = MultiPart::mixed().singlepart(SinglePart::plain(notification.body.clone()));
        if let Some(path) = &notification.attachment {
            match std::fs::read(path) {
                Ok(bytes) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "snapshot".to_string());
                    let content_type = content_type_for(path)?;
                    body = body.singlepart(Attachment::new(name).body(bytes, content_type));
                }
                Err(e) => warn!("Snapshot {} not attached: {}", path.display(), e),
            }
        }

        builder
            .multipart(body)
            .map_err(|e| CloudError::Message(e.to_string()))
    }
}

fn content_type_for(path: &Path) -> Result<ContentType, CloudError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    };
    ContentType::parse(mime).map_err(|e| CloudError::Message(e.to_string()))
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), AlertError> {
        let message = self.build_message(notification)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| CloudError::Publish(e.to_string()))?;
        debug!(
            "Alert mailed to {} recipient(s) via {}",
            notification.recipients.len(),
            self.config.smtp_server
        );
        Ok(())
    }
}
