//! Slack webhook notification channel.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::notification::Notification;
use crate::NotifyChannel;

/// Environment variable for Slack webhook URL.
const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";

/// Slack incoming-webhook channel.
pub struct SlackChannel {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a new Slack channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let webhook_url = std::env::var(ENV_SLACK_WEBHOOK_URL)
            .ok()
            .filter(|v| !v.trim().is_empty());

        if webhook_url.is_some() {
            debug!("Slack notifications enabled");
        } else {
            debug!("Slack notifications disabled (SLACK_WEBHOOK_URL not set)");
        }

        Self {
            webhook_url,
            client: crate::http_client(),
        }
    }

    /// Create a Slack channel with a specific webhook URL.
    #[must_use]
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: Some(webhook_url.into()),
            client: crate::http_client(),
        }
    }

    /// Override the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    /// Format a notification as a Slack webhook payload.
    fn format_payload(notification: &Notification) -> SlackPayload {
        let mut blocks = Vec::with_capacity(2);

        if let Some(title) = &notification.title {
            blocks.push(SlackBlock::Header {
                text: SlackText::plain(title),
            });
        }

        blocks.push(SlackBlock::Section {
            text: SlackText::mrkdwn(&notification.message),
        });

        SlackPayload {
            text: notification.message.clone(),
            blocks,
            attachments: vec![SlackAttachment {
                color: notification.severity.slack_color().to_string(),
            }],
        }
    }
}

#[async_trait]
impl NotifyChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        let webhook_url = self
            .webhook_url
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_SLACK_WEBHOOK_URL.to_string()))?;

        let payload = Self::format_payload(notification);

        debug!(channel = "slack", severity = %notification.severity, "Sending notification");

        let response = self.client.post(webhook_url).json(&payload).send().await?;

        if response.status().is_success() {
            debug!(channel = "slack", "Notification sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                channel = "slack",
                status = %status,
                body = %body,
                "Slack webhook request failed"
            );

            Err(ChannelError::Rejected {
                channel: "slack",
                status: status.as_u16(),
                body,
            })
        }
    }
}

// =============================================================================
// Slack API types
// =============================================================================

#[derive(Debug, Serialize)]
struct SlackPayload {
    text: String,
    blocks: Vec<SlackBlock>,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SlackBlock {
    Header { text: SlackText },
    Section { text: SlackText },
}

#[derive(Debug, Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

impl SlackText {
    fn plain(text: &str) -> Self {
        Self {
            kind: "plain_text",
            text: text.to_string(),
        }
    }

    fn mrkdwn(text: &str) -> Self {
        Self {
            kind: "mrkdwn",
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
}
