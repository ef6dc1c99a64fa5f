use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Sender id carried by system-generated wake envelopes.
pub const SYSTEM_SENDER: &str = "system";

/// Sentinel body of a notification wake envelope. Carries no payload beyond
/// "something changed, re-fetch".
pub const WAKE_MESSAGE: &str = "new_notification";

/// Conversation channels and notification channels share one provider account,
/// so the namespaces must never collide.
pub fn conversation_channel(conversation_id: &str) -> String {
    format!("chat:{conversation_id}")
}

pub fn notification_channel(recipient_id: &str) -> String {
    format!("notifications:{recipient_id}")
}

/// Client-generated message id: unix millis plus a random alphanumeric suffix.
/// The id is generated before publish so the optimistic local copy and the
/// provider echo share an identity.
pub fn client_message_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// The message envelope as it travels over the realtime provider.
///
/// Field names are the provider contract; the durable record uses the same
/// logical id so the two representations reconcile after a re-fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl WireEnvelope {
    /// A chat message envelope with a fresh client-generated id.
    pub fn chat(conversation_id: &str, sender_id: &str, body: &str) -> Self {
        Self {
            id: client_message_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            message: body.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// A notification wake envelope. The `conversation_id` field carries the
    /// notification channel name itself so the channel filter treats the wake
    /// as on-channel.
    pub fn wake(recipient_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: notification_channel(recipient_id),
            sender_id: SYSTEM_SENDER.to_string(),
            message: WAKE_MESSAGE.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_wake(&self) -> bool {
        self.sender_id == SYSTEM_SENDER && self.message == WAKE_MESSAGE
    }

    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            body: self.message,
            created_at: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_namespaces_are_distinct() {
        assert_eq!(conversation_channel("c-9"), "chat:c-9");
        assert_eq!(notification_channel("alice"), "notifications:alice");
        assert_ne!(conversation_channel("x"), notification_channel("x"));
    }

    #[test]
    fn client_message_id_shape() {
        let id = client_message_id();
        let (millis, suffix) = id.split_once('-').expect("dash separator");
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn client_message_ids_are_unique() {
        let a = client_message_id();
        let b = client_message_id();
        assert_ne!(a, b);
    }

    #[test]
    fn envelope_uses_provider_field_names() {
        let env = WireEnvelope::chat("c1", "alice", "hi");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["senderId"], "alice");
        assert_eq!(json["message"], "hi");
        assert!(json["id"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn wake_envelope_shape() {
        let env = WireEnvelope::wake("bob");
        assert!(env.is_wake());
        assert_eq!(env.conversation_id, "notifications:bob");
        assert_eq!(env.sender_id, "system");
        assert_eq!(env.message, "new_notification");
        assert!(Uuid::parse_str(&env.id).is_ok());
    }

    #[test]
    fn chat_envelope_is_not_a_wake() {
        let env = WireEnvelope::chat("c1", "alice", "new_notification");
        assert!(!env.is_wake());
    }

    #[test]
    fn into_message_preserves_identity() {
        let env = WireEnvelope::chat("c1", "alice", "hi there");
        let id = env.id.clone();
        let msg = env.into_message();
        assert_eq!(msg.id, id);
        assert_eq!(msg.conversation_id, "c1");
        assert_eq!(msg.sender_id, "alice");
        assert_eq!(msg.body, "hi there");
    }
}
