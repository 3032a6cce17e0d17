//! Notification tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use notify::{summarize, Notification, Notifier, Severity};

use super::{parse_args, Tool};

#[derive(Debug, Deserialize)]
struct MessageArgs {
    message: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    severity: Option<String>,
}

impl MessageArgs {
    fn into_notification(self) -> Notification {
        let mut notification = Notification::new(self.message)
            .with_severity(Severity::parse(self.severity.as_deref().unwrap_or("info")));
        if let Some(title) = self.title {
            notification = notification.with_title(title);
        }
        notification
    }
}

#[derive(Debug, Deserialize)]
struct EmailArgs {
    message: String,
    subject: String,
    #[serde(default)]
    to_email: Option<String>,
    #[serde(default)]
    severity: Option<String>,
}

fn message_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "message": {"type": "string", "description": "The message to send"},
            "title": {"type": "string", "description": "Optional title for the message"},
            "severity": {
                "type": "string",
                "enum": ["info", "warning", "error"],
                "description": "Severity level",
                "default": "info"
            }
        },
        "required": ["message"]
    })
}

/// Single-channel delivery rendered the way the per-channel tools report it.
async fn send_single(notifier: &Notifier, channel: &str, label: &str, args: Value, tool: &str) -> String {
    let args = match parse_args::<MessageArgs>(tool, args) {
        Ok(args) => args,
        Err(e) => return e,
    };

    match notifier.send_via(channel, &args.into_notification()).await {
        Some(true) => format!("{label} notification sent successfully"),
        Some(false) => format!("Failed to send {label} notification"),
        None => format!("Failed to send {label} notification: channel not configured"),
    }
}

/// `send_notification`: fan out to the default channels.
pub struct SendNotification {
    notifier: Arc<Notifier>,
}

impl SendNotification {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Tool for SendNotification {
    fn name(&self) -> &'static str {
        "send_notification"
    }

    fn description(&self) -> &'static str {
        "Send a notification through all configured channels."
    }

    fn parameters(&self) -> Value {
        message_schema()
    }

    async fn call(&self, args: Value) -> String {
        match parse_args::<MessageArgs>(self.name(), args) {
            Ok(args) => {
                let outcomes = self.notifier.notify(&args.into_notification(), None).await;
                summarize(&outcomes)
            }
            Err(e) => e,
        }
    }
}

/// `send_slack_notification`
pub struct SendSlackNotification {
    notifier: Arc<Notifier>,
}

impl SendSlackNotification {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Tool for SendSlackNotification {
    fn name(&self) -> &'static str {
        "send_slack_notification"
    }

    fn description(&self) -> &'static str {
        "Send a notification through Slack."
    }

    fn parameters(&self) -> Value {
        message_schema()
    }

    async fn call(&self, args: Value) -> String {
        send_single(&self.notifier, "slack", "Slack", args, self.name()).await
    }
}

/// `send_teams_notification`
pub struct SendTeamsNotification {
    notifier: Arc<Notifier>,
}

impl SendTeamsNotification {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Tool for SendTeamsNotification {
    fn name(&self) -> &'static str {
        "send_teams_notification"
    }

    fn description(&self) -> &'static str {
        "Send a notification through Microsoft Teams."
    }

    fn parameters(&self) -> Value {
        message_schema()
    }

    async fn call(&self, args: Value) -> String {
        send_single(&self.notifier, "teams", "Teams", args, self.name()).await
    }
}

/// `send_email_notification`
pub struct SendEmailNotification {
    notifier: Arc<Notifier>,
}

impl SendEmailNotification {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Tool for SendEmailNotification {
    fn name(&self) -> &'static str {
        "send_email_notification"
    }

    fn description(&self) -> &'static str {
        "Send a notification through email."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "The message to send"},
                "subject": {"type": "string", "description": "Email subject"},
                "to_email": {"type": "string", "description": "Recipient email address"},
                "severity": {
                    "type": "string",
                    "enum": ["info", "warning", "error"],
                    "default": "info"
                }
            },
            "required": ["message", "subject"]
        })
    }

    async fn call(&self, args: Value) -> String {
        let args = match parse_args::<EmailArgs>(self.name(), args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        let mut notification = Notification::new(args.message)
            .with_title(args.subject)
            .with_severity(Severity::parse(args.severity.as_deref().unwrap_or("info")));
        if let Some(to) = args.to_email {
            notification = notification.with_recipient(to);
        }

        match self.notifier.send_via("email", &notification).await {
            Some(true) => "Email notification sent successfully".to_string(),
            Some(false) => "Failed to send email notification".to_string(),
            None => "Failed to send email notification: channel not configured".to_string(),
        }
    }
}
