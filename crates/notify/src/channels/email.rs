//! SMTP email relay channel.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::error::ChannelError;
use crate::notification::Notification;
use crate::NotifyChannel;

/// Subject used when a notification carries no title.
pub const DEFAULT_SUBJECT: &str = "Kubernetes Monitor Alert";

/// SMTP relay settings. All fields are required to enable the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender address, also the fallback recipient
    pub from_address: String,
}

impl SmtpConfig {
    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD` and
    /// `NOTIFICATION_EMAIL`. Returns `None` unless every value is present.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Some(Self {
            host: var("SMTP_HOST")?,
            port: var("SMTP_PORT")?.parse().ok()?,
            username: var("SMTP_USERNAME")?,
            password: var("SMTP_PASSWORD")?,
            from_address: var("NOTIFICATION_EMAIL")?,
        })
    }
}

/// Email channel delivering plain-text alerts over STARTTLS.
pub struct EmailChannel {
    config: Option<SmtpConfig>,
}

impl EmailChannel {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self {
            config: Some(config),
        }
    }

    /// Create from environment variables; disabled if any setting is missing.
    #[must_use]
    pub fn from_env() -> Self {
        let config = SmtpConfig::from_env();
        if config.is_none() {
            debug!("Email notifications disabled (SMTP settings incomplete)");
        }
        Self { config }
    }

    /// Build the email for a notification.
    fn build_message(config: &SmtpConfig, notification: &Notification) -> Result<Message, ChannelError> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| ChannelError::Smtp(format!("invalid from address: {e}")))?;

        let to: Mailbox = notification
            .recipient
            .as_deref()
            .unwrap_or(&config.from_address)
            .parse()
            .map_err(|e| ChannelError::Smtp(format!("invalid recipient address: {e}")))?;

        let subject = format!(
            "[{}] {}",
            notification.severity.as_str().to_uppercase(),
            notification.title.as_deref().unwrap_or(DEFAULT_SUBJECT)
        );

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(notification.message.clone())
            .map_err(|e| ChannelError::Smtp(format!("failed to build email: {e}")))
    }
}

#[async_trait]
impl NotifyChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn enabled(&self) -> bool {
        self.config.is_some()
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured("SMTP_HOST".to_string()))?;

        let email = Self::build_message(config, notification)?;

        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| ChannelError::Smtp(e.to_string()))?
                .port(config.port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| ChannelError::Smtp(e.to_string()))?;

        info!(channel = "email", host = %config.host, "Email notification sent");

        Ok(())
    }
}
