use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Conversation, Message, Notification, RentalRequest, RentalStatus};

/// The collaborator wraps every response body in a `data` envelope.
#[derive(Debug, Deserialize)]
pub struct Items<T> {
    pub data: T,
}

// -- Messages --

/// A message as stored in the collaborator's `messages` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation: String,
    pub sender: String,
    pub message: String,
    pub date_created: DateTime<Utc>,
}

impl From<MessageRecord> for Message {
    fn from(r: MessageRecord) -> Self {
        Message {
            id: r.id,
            conversation_id: r.conversation,
            sender_id: r.sender,
            body: r.message,
            created_at: r.date_created,
        }
    }
}

/// Create payload for `messages`. The id is the client-generated envelope id,
/// forwarded so durable history and live traffic share message identity.
#[derive(Debug, Serialize)]
pub struct CreateMessage<'a> {
    pub id: &'a str,
    pub conversation: &'a str,
    pub sender: &'a str,
    pub message: &'a str,
}

// -- Conversations --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub user_1: String,
    pub user_2: String,
    #[serde(default)]
    pub gear_listing: Option<String>,
}

impl From<ConversationRecord> for Conversation {
    fn from(r: ConversationRecord) -> Self {
        Conversation {
            id: r.id,
            user_1: r.user_1,
            user_2: r.user_2,
            gear_listing: r.gear_listing,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateConversation<'a> {
    pub user_1: &'a str,
    pub user_2: &'a str,
    pub gear_listing: &'a str,
}

// -- Rental requests --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalRequestRecord {
    pub id: String,
    pub gear_listing: String,
    pub renter: String,
    pub owner: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: RentalStatus,
}

impl From<RentalRequestRecord> for RentalRequest {
    fn from(r: RentalRequestRecord) -> Self {
        RentalRequest {
            id: r.id,
            gear_listing: r.gear_listing,
            renter_id: r.renter,
            owner_id: r.owner,
            start_date: r.start_date,
            end_date: r.end_date,
            status: r.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateRentalRequest<'a> {
    pub gear_listing: &'a str,
    pub renter: &'a str,
    pub owner: &'a str,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UpdateRentalStatus {
    pub status: RentalStatus,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub client: String,
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub request: Option<String>,
    pub read: bool,
    pub date_created: DateTime<Utc>,
}

impl From<NotificationRecord> for Notification {
    fn from(r: NotificationRecord) -> Self {
        Notification {
            id: r.id,
            client_id: r.client,
            conversation: r.conversation,
            request: r.request,
            read: r.read,
            created_at: r.date_created,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateNotification<'a> {
    pub client: &'a str,
    pub conversation: Option<&'a str>,
    pub request: Option<&'a str>,
    pub read: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdateNotification {
    pub read: bool,
}
