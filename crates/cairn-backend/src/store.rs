//! Seam implementations: the backend is the durable side of the realtime
//! feed and the notification fan-out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cairn_notify::{NotificationStore, PartyDirectory};
use cairn_realtime::feed::MessageStore;
use cairn_types::models::{Conversation, Message, Notification, NotificationCause, RentalRequest};
use cairn_types::wire::WireEnvelope;

use crate::Backend;

#[async_trait]
impl MessageStore for Backend {
    async fn fetch_history(&self, conversation_id: &str) -> anyhow::Result<Vec<Message>> {
        Ok(self.fetch_message_history(conversation_id).await?)
    }

    async fn fetch_since(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Message>> {
        Ok(self.fetch_messages_since(conversation_id, since).await?)
    }

    async fn persist(&self, envelope: &WireEnvelope) -> anyhow::Result<Message> {
        Ok(self.persist_message(envelope).await?)
    }
}

#[async_trait]
impl NotificationStore for Backend {
    async fn create(
        &self,
        recipient_id: &str,
        cause: &NotificationCause,
    ) -> anyhow::Result<Notification> {
        Ok(self.create_notification(recipient_id, cause).await?)
    }

    async fn set_read(&self, notification_id: &str) -> anyhow::Result<Notification> {
        Ok(self.set_notification_read(notification_id).await?)
    }
}

#[async_trait]
impl PartyDirectory for Backend {
    async fn conversation(&self, conversation_id: &str) -> anyhow::Result<Conversation> {
        Ok(self.get_conversation(conversation_id).await?)
    }

    async fn rental_request(&self, request_id: &str) -> anyhow::Result<RentalRequest> {
        Ok(self.get_rental_request(request_id).await?)
    }
}
