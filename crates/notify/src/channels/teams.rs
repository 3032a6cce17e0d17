//! Microsoft Teams connector-card channel.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::notification::Notification;
use crate::NotifyChannel;

/// Environment variable for the Teams incoming-webhook URL.
const ENV_TEAMS_WEBHOOK_URL: &str = "TEAMS_WEBHOOK_URL";

/// Teams `MessageCard` webhook channel.
pub struct TeamsChannel {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl TeamsChannel {
    /// Create a new Teams channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let webhook_url = std::env::var(ENV_TEAMS_WEBHOOK_URL)
            .ok()
            .filter(|v| !v.trim().is_empty());

        if webhook_url.is_none() {
            debug!("Teams notifications disabled (TEAMS_WEBHOOK_URL not set)");
        }

        Self {
            webhook_url,
            client: crate::http_client(),
        }
    }

    /// Create a Teams channel with a specific webhook URL.
    #[must_use]
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: Some(webhook_url.into()),
            client: crate::http_client(),
        }
    }

    fn format_card(notification: &Notification) -> MessageCard {
        MessageCard {
            kind: "MessageCard",
            context: "http://schema.org/extensions",
            summary: notification
                .title
                .clone()
                .unwrap_or_else(|| notification.message.chars().take(80).collect()),
            title: notification.title.clone(),
            text: notification.message.clone(),
            theme_color: notification.severity.teams_color().map(str::to_string),
        }
    }
}

#[async_trait]
impl NotifyChannel for TeamsChannel {
    fn name(&self) -> &'static str {
        "teams"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        let webhook_url = self
            .webhook_url
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_TEAMS_WEBHOOK_URL.to_string()))?;

        let card = Self::format_card(notification);

        let response = self.client.post(webhook_url).json(&card).send().await?;

        if response.status().is_success() {
            debug!(channel = "teams", "Notification sent successfully");
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(channel = "teams", status = %status, body = %body, "Teams webhook request failed");

        Err(ChannelError::Rejected {
            channel: "teams",
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Serialize)]
struct MessageCard {
    #[serde(rename = "@type")]
    kind: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    text: String,
    #[serde(rename = "themeColor", skip_serializing_if = "Option::is_none")]
    theme_color: Option<String>,
}
