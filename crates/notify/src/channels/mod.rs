//! Notification channel implementations.

pub mod email;
pub mod slack;
pub mod teams;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::notification::Notification;

/// Trait for notification channels (Slack, Teams, email).
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel, as used in channel selections.
    fn name(&self) -> &'static str;

    /// Check if this channel is enabled/configured.
    fn enabled(&self) -> bool;

    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), ChannelError>;
}
