//! Error types for the notification system.

use thiserror::Error;

/// Errors that can occur when delivering through a single channel.
///
/// These never escape [`crate::Notifier::notify`]; they are logged and folded
/// into the outcome map.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel is not configured
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// The webhook answered with a non-success status
    #[error("{channel} returned {status}: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },

    /// Email could not be built or relayed
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}
