use serde::{Deserialize, Serialize};

use crate::wire::WireEnvelope;

/// Commands sent FROM the client TO the realtime provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProviderCommand {
    /// Request attachment to a named channel
    Attach { channel: String },

    /// Release a channel attachment
    Detach { channel: String },

    /// Publish an envelope into a channel. The provider acknowledges with
    /// `ProviderEvent::PublishAck` carrying the same envelope id.
    Publish {
        channel: String,
        message: WireEnvelope,
    },
}

/// Events sent FROM the realtime provider TO the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProviderEvent {
    /// The provider reports a channel as attached
    Attached { channel: String },

    /// The provider reports a channel as detached
    Detached { channel: String },

    /// An inbound envelope on an attached channel
    Message {
        channel: String,
        message: WireEnvelope,
    },

    /// End-to-end acknowledgement of a publish, matched by envelope id
    PublishAck { channel: String, id: String },
}

impl ProviderEvent {
    /// The channel this event is scoped to. Every provider event is
    /// channel-scoped; the accessor exists so routing code never matches on
    /// variants it doesn't care about.
    pub fn channel(&self) -> &str {
        match self {
            Self::Attached { channel }
            | Self::Detached { channel }
            | Self::Message { channel, .. }
            | Self::PublishAck { channel, .. } => channel,
        }
    }
}
