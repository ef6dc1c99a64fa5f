use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy for the realtime subsystem.
///
/// Transport and channel failures are recovered locally where possible
/// (reconnect, re-attach) and only surface once recovery is exhausted.
/// `Validation` is raised before any network call and is never retried.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Required provider credentials are absent. Fatal at startup.
    #[error("realtime provider is not configured: {0}")]
    Configuration(String),

    /// No `connected` transition arrived within the bounded wait.
    #[error("connection timeout after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The provider did not report the channel attached in time.
    #[error("timed out attaching channel {0}")]
    AttachTimeout(String),

    /// Publish attempted on a detached channel and the inline re-attach
    /// did not recover it.
    #[error("channel {0} is not attached")]
    ChannelNotAttached(String),

    /// No end-to-end publish acknowledgement within the bounded wait.
    #[error("publish timeout after {0:?}")]
    PublishTimeout(Duration),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("transport is not connected")]
    NotConnected,

    /// Terminal: the reconnect controller gave up. The feed keeps working in
    /// degraded poll-on-demand mode; sends are refused with this error.
    #[error("realtime connection unavailable after {0} reconnect attempts")]
    ReconnectExhausted(u32),

    /// The durable history fetch against the data-access collaborator failed.
    #[error("durable fetch failed: {0}")]
    FetchFailed(String),

    /// Rejected locally before any network call.
    #[error("{0}")]
    Validation(&'static str),
}
