use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum accepted message body length, in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// A conversation between two marketplace users, optionally anchored to the
/// gear listing that started it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_1: String,
    pub user_2: String,
    pub gear_listing: Option<String>,
}

impl Conversation {
    /// The two participants must be distinct users.
    pub fn is_valid(&self) -> bool {
        self.user_1 != self.user_2
    }

    /// Membership is symmetric: a conversation belongs to a user if they are
    /// either participant.
    pub fn involves(&self, user_id: &str) -> bool {
        self.user_1 == user_id || self.user_2 == user_id
    }

    /// The other participant, or `None` if `user_id` is not in this
    /// conversation at all.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.user_1 == user_id {
            Some(&self.user_2)
        } else if self.user_2 == user_id {
            Some(&self.user_1)
        } else {
            None
        }
    }
}

/// A chat message. Immutable once sent; there is no edit or delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a rental request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl std::fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalRequest {
    pub id: String,
    pub gear_listing: String,
    pub renter_id: String,
    pub owner_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: RentalStatus,
}

/// What triggered a notification. A notification references exactly one cause;
/// conversation-triggered and request-triggered notifications route to
/// different places in the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationCause {
    Conversation(String),
    Request(String),
}

/// A durable per-recipient notification record. Created unread by the fan-out
/// and only ever mutated to flip `read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub client_id: String,
    pub conversation: Option<String>,
    pub request: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn cause(&self) -> Option<NotificationCause> {
        match (&self.conversation, &self.request) {
            (Some(c), _) => Some(NotificationCause::Conversation(c.clone())),
            (None, Some(r)) => Some(NotificationCause::Request(r.clone())),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation {
            id: "c1".into(),
            user_1: "alice".into(),
            user_2: "bob".into(),
            gear_listing: Some("tent-42".into()),
        }
    }

    #[test]
    fn membership_is_symmetric() {
        let c = conversation();
        assert!(c.involves("alice"));
        assert!(c.involves("bob"));
        assert!(!c.involves("mallory"));
    }

    #[test]
    fn counterpart_resolution() {
        let c = conversation();
        assert_eq!(c.counterpart("alice"), Some("bob"));
        assert_eq!(c.counterpart("bob"), Some("alice"));
        assert_eq!(c.counterpart("mallory"), None);
    }

    #[test]
    fn participants_must_differ() {
        let mut c = conversation();
        assert!(c.is_valid());
        c.user_2 = "alice".into();
        assert!(!c.is_valid());
    }

    #[test]
    fn rental_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RentalStatus::Approved).unwrap(),
            "\"approved\""
        );
        let s: RentalStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(s, RentalStatus::Completed);
    }

    #[test]
    fn notification_cause_prefers_the_set_reference() {
        let n = Notification {
            id: "n1".into(),
            client_id: "alice".into(),
            conversation: Some("c1".into()),
            request: None,
            read: false,
            created_at: Utc::now(),
        };
        assert_eq!(n.cause(), Some(NotificationCause::Conversation("c1".into())));

        let n = Notification {
            conversation: None,
            request: Some("r1".into()),
            ..n
        };
        assert_eq!(n.cause(), Some(NotificationCause::Request("r1".into())));
    }
}
