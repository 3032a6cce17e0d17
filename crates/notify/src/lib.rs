//! Multi-channel alert dispatch for the cluster monitor.
//!
//! An alert is fanned out to every requested channel independently; each
//! channel's success or failure is reported back in an outcome map instead of
//! being raised, so one broken webhook never hides delivery on another.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notification, Notifier, Severity};
//!
//! # async fn demo() {
//! let notifier = Notifier::from_env();
//!
//! let outcomes = notifier
//!     .notify(
//!         &Notification::new("node-2 is NotReady").with_severity(Severity::Error),
//!         None,
//!     )
//!     .await;
//!
//! println!("{}", notify::summarize(&outcomes));
//! # }
//! ```
//!
//! # Configuration
//!
//! - `NOTIFICATION_CHANNELS`: comma-separated default channel list (default `slack`)
//! - `SLACK_WEBHOOK_URL`: enables the `slack` channel
//! - `TEAMS_WEBHOOK_URL`: enables the `teams` channel
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
//!   `NOTIFICATION_EMAIL`: together enable the `email` channel
//! - `NOTIFY_DISABLED`: set to "true" to disable all notifications

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod notification;

pub use channels::email::{EmailChannel, SmtpConfig};
pub use channels::slack::SlackChannel;
pub use channels::teams::TeamsChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use notification::{Notification, Severity};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Environment variable to disable all notifications.
const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Environment variable holding the default channel selection.
const ENV_NOTIFICATION_CHANNELS: &str = "NOTIFICATION_CHANNELS";

/// Default timeout for webhook requests.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-channel delivery result, keyed by channel name.
///
/// Only channels that were actually attempted appear in the map.
pub type Outcomes = BTreeMap<String, bool>;

/// Shared HTTP client for webhook channels.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Parse a comma-separated channel list, dropping blanks.
#[must_use]
pub fn parse_channel_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Central notification dispatcher.
///
/// The `Notifier` owns the configured channels and a default selection used
/// when a caller does not name channels explicitly.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    default_channels: Vec<String>,
    disabled: bool,
}

impl Notifier {
    /// Create a new notifier from environment variables.
    ///
    /// Every channel with credentials is registered; `NOTIFICATION_CHANNELS`
    /// only picks the default selection used by [`Notifier::notify`].
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("Notifications disabled via NOTIFY_DISABLED");
            return Self::disabled();
        }

        let selected = std::env::var(ENV_NOTIFICATION_CHANNELS)
            .map(|v| parse_channel_list(&v))
            .unwrap_or_else(|_| vec!["slack".to_string()]);

        let candidates: Vec<Arc<dyn NotifyChannel>> = vec![
            Arc::new(SlackChannel::from_env()),
            Arc::new(TeamsChannel::from_env()),
            Arc::new(EmailChannel::from_env()),
        ];

        Self::with_channels(candidates).with_default_channels(selected)
    }

    /// Create a notifier with specific channels.
    ///
    /// Channels that report themselves as not enabled are dropped. The default
    /// selection is every registered channel.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        let channels: Vec<Arc<dyn NotifyChannel>> = channels
            .into_iter()
            .filter(|c| {
                let enabled = c.enabled();
                if !enabled {
                    debug!(channel = c.name(), "Channel not configured, skipping");
                }
                enabled
            })
            .collect();

        if channels.is_empty() {
            warn!("No notification channels configured");
        } else {
            info!(
                channel_count = channels.len(),
                "Notification system initialized"
            );
        }

        let default_channels = channels.iter().map(|c| c.name().to_string()).collect();

        Self {
            channels,
            default_channels,
            disabled: false,
        }
    }

    /// Replace the default channel selection.
    #[must_use]
    pub fn with_default_channels(mut self, names: Vec<String>) -> Self {
        self.default_channels = names;
        self
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            default_channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.len()
        }
    }

    /// Names of the registered channels, in registration order.
    #[must_use]
    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Deliver a notification to the requested channels.
    ///
    /// `channels = None` uses the default selection. Requested channels that
    /// are not configured are skipped without an entry. Channels are tried one
    /// after another; a failure is logged and recorded as `false`.
    pub async fn notify(&self, notification: &Notification, channels: Option<&[String]>) -> Outcomes {
        let mut outcomes = Outcomes::new();

        if self.disabled {
            debug!("Notifications disabled, skipping");
            return outcomes;
        }

        let requested = channels.unwrap_or(&self.default_channels);

        for channel in &self.channels {
            let name = channel.name();
            if !requested.iter().any(|r| r.eq_ignore_ascii_case(name)) {
                continue;
            }

            let delivered = match channel.send(notification).await {
                Ok(()) => {
                    debug!(channel = name, "Notification sent");
                    true
                }
                Err(e) => {
                    error!(channel = name, error = %e, "Failed to send notification");
                    false
                }
            };

            outcomes.insert(name.to_string(), delivered);
        }

        outcomes
    }

    /// Deliver through a single named channel.
    ///
    /// Returns `None` when that channel is not configured.
    pub async fn send_via(&self, channel: &str, notification: &Notification) -> Option<bool> {
        let requested = [channel.to_string()];
        self.notify(notification, Some(&requested))
            .await
            .get(channel.to_ascii_lowercase().as_str())
            .copied()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Human-readable summary of an outcome map.
#[must_use]
pub fn summarize(outcomes: &Outcomes) -> String {
    let delivered: Vec<&str> = outcomes
        .iter()
        .filter(|(_, ok)| **ok)
        .map(|(name, _)| name.as_str())
        .collect();

    if delivered.is_empty() {
        "Failed to send notification to any channel".to_string()
    } else {
        format!(
            "Notification sent successfully to: {}",
            delivered.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeChannel {
        name: &'static str,
        enabled: bool,
        succeed: bool,
        sends: AtomicUsize,
    }

    impl FakeChannel {
        fn new(name: &'static str, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                enabled: true,
                succeed,
                sends: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NotifyChannel for FakeChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        async fn send(&self, _notification: &Notification) -> Result<(), ChannelError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err(ChannelError::Other("boom".to_string()))
            }
        }
    }

    fn as_dyn(channel: &Arc<FakeChannel>) -> Arc<dyn NotifyChannel> {
        channel.clone()
    }

    #[test]
    fn test_disabled_notifier() {
        let notifier = Notifier::disabled();
        assert!(!notifier.has_channels());
        assert_eq!(notifier.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_success() {
        let slack = FakeChannel::new("slack", true);
        let teams = FakeChannel::new("teams", false);
        let notifier = Notifier::with_channels(vec![as_dyn(&slack), as_dyn(&teams)]);

        let outcomes = notifier.notify(&Notification::new("hello"), None).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.get("slack"), Some(&true));
        assert_eq!(outcomes.get("teams"), Some(&false));
        assert_eq!(summarize(&outcomes), "Notification sent successfully to: slack");
    }

    #[tokio::test]
    async fn test_unconfigured_channel_has_no_entry() {
        let unconfigured = Arc::new(FakeChannel {
            name: "email",
            enabled: false,
            succeed: true,
            sends: AtomicUsize::new(0),
        });
        let slack = FakeChannel::new("slack", true);
        let notifier = Notifier::with_channels(vec![as_dyn(&slack), as_dyn(&unconfigured)]);

        let requested = vec!["slack".to_string(), "email".to_string(), "pager".to_string()];
        let outcomes = notifier
            .notify(&Notification::new("hello"), Some(&requested))
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes["slack"]);
        assert_eq!(unconfigured.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explicit_selection_limits_fan_out() {
        let slack = FakeChannel::new("slack", true);
        let teams = FakeChannel::new("teams", true);
        let notifier = Notifier::with_channels(vec![as_dyn(&slack), as_dyn(&teams)]);

        let outcomes = notifier
            .notify(&Notification::new("hello"), Some(&["TEAMS".to_string()]))
            .await;

        assert_eq!(outcomes.keys().collect::<Vec<_>>(), vec!["teams"]);
        assert_eq!(slack.sends.load(Ordering::SeqCst), 0);
        assert_eq!(teams.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_selection_is_respected() {
        let slack = FakeChannel::new("slack", true);
        let teams = FakeChannel::new("teams", true);
        let notifier = Notifier::with_channels(vec![as_dyn(&slack), as_dyn(&teams)])
            .with_default_channels(vec!["slack".to_string()]);

        let outcomes = notifier.notify(&Notification::new("hello"), None).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(teams.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_via() {
        let teams = FakeChannel::new("teams", false);
        let notifier = Notifier::with_channels(vec![as_dyn(&teams)]);

        assert_eq!(notifier.send_via("teams", &Notification::new("x")).await, Some(false));
        assert_eq!(notifier.send_via("slack", &Notification::new("x")).await, None);
    }

    #[test]
    fn test_summary_when_nothing_delivered() {
        let mut outcomes = Outcomes::new();
        assert_eq!(summarize(&outcomes), "Failed to send notification to any channel");
        outcomes.insert("email".to_string(), false);
        assert_eq!(summarize(&outcomes), "Failed to send notification to any channel");
    }

    #[test]
    fn test_parse_channel_list() {
        assert_eq!(
            parse_channel_list(" Slack, teams,,email "),
            vec!["slack", "teams", "email"]
        );
        assert!(parse_channel_list("").is_empty());
    }

    fn clear_notify_env() {
        for var in [
            ENV_NOTIFY_DISABLED,
            ENV_NOTIFICATION_CHANNELS,
            "SLACK_WEBHOOK_URL",
            "TEAMS_WEBHOOK_URL",
            "SMTP_HOST",
            "SMTP_PORT",
            "SMTP_USERNAME",
            "SMTP_PASSWORD",
            "NOTIFICATION_EMAIL",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_registers_credentialed_channels() {
        clear_notify_env();
        std::env::set_var("SLACK_WEBHOOK_URL", "https://hooks.slack.test/T000");
        std::env::set_var("TEAMS_WEBHOOK_URL", "https://teams.test/webhook");
        std::env::set_var(ENV_NOTIFICATION_CHANNELS, "teams");

        let notifier = Notifier::from_env();
        assert_eq!(notifier.channel_names(), vec!["slack", "teams"]);
        assert_eq!(notifier.default_channels, vec!["teams"]);

        clear_notify_env();
    }

    #[test]
    #[serial]
    fn test_from_env_respects_kill_switch() {
        clear_notify_env();
        std::env::set_var("SLACK_WEBHOOK_URL", "https://hooks.slack.test/T000");
        std::env::set_var(ENV_NOTIFY_DISABLED, "true");

        let notifier = Notifier::from_env();
        assert!(!notifier.has_channels());

        clear_notify_env();
    }
}
