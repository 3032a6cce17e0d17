//! Alert payload and severity levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity levels for alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    #[default]
    Info,
    /// Warning - something needs attention
    Warning,
    /// Error - human intervention required
    Error,
}

impl Severity {
    /// Parse a severity name leniently.
    ///
    /// Unknown values fall back to [`Severity::Info`] instead of failing, so a
    /// badly worded request from the agent still gets delivered.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "warning" | "warn" => Self::Warning,
            "error" | "critical" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Slack attachment color for this severity.
    #[must_use]
    pub const fn slack_color(&self) -> &'static str {
        match self {
            Self::Info => "#36a64f",    // Green
            Self::Warning => "#ffd700", // Gold
            Self::Error => "#ff0000",   // Red
        }
    }

    /// Teams card theme color. Informational cards keep the default theme.
    #[must_use]
    pub const fn teams_color(&self) -> Option<&'static str> {
        match self {
            Self::Info => None,
            Self::Warning => Some("ffd700"),
            Self::Error => Some("ff0000"),
        }
    }

    /// Lowercase name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single alert to fan out across channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Message body (markdown is passed through to chat channels)
    pub message: String,
    /// Optional headline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    /// Email recipient override; chat channels ignore it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl Notification {
    /// Create an informational notification.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            title: None,
            severity: Severity::Info,
            recipient: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}
