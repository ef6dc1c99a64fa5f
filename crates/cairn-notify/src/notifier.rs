use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use cairn_realtime::RealtimeError;
use cairn_realtime::channel::ChannelSession;
use cairn_realtime::transport::Transport;
use cairn_types::models::{Conversation, Notification, NotificationCause, RentalRequest, RentalStatus};
use cairn_types::wire::WireEnvelope;

use crate::recipient::{message_recipient, rental_recipient};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification store error: {0}")]
    Store(String),

    #[error("directory lookup failed: {0}")]
    Directory(String),

    #[error("user {sender} is not a participant of conversation {conversation}")]
    UnknownRecipient { conversation: String, sender: String },
}

/// Durable notification operations provided by the data-access layer.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(
        &self,
        recipient_id: &str,
        cause: &NotificationCause,
    ) -> anyhow::Result<Notification>;

    /// Must be idempotent: re-marking a read notification is a no-op success.
    async fn set_read(&self, notification_id: &str) -> anyhow::Result<Notification>;
}

/// Lookups needed to resolve a domain event to its recipient.
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn conversation(&self, conversation_id: &str) -> anyhow::Result<Conversation>;
    async fn rental_request(&self, request_id: &str) -> anyhow::Result<RentalRequest>;
}

/// Fan-out for domain events: make sure the intended recipient learns about
/// the event whether or not they currently hold a live connection.
pub struct Notifier {
    store: Arc<dyn NotificationStore>,
    directory: Arc<dyn PartyDirectory>,
    transport: Transport,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        directory: Arc<dyn PartyDirectory>,
        transport: Transport,
    ) -> Self {
        Self {
            store,
            directory,
            transport,
        }
    }

    /// Two-phase delivery. The durable record must land — that's the call's
    /// success criterion. The wake publish on the recipient's channel is
    /// best-effort: a failure is logged and swallowed, because a client can
    /// always poll.
    pub async fn notify(
        &self,
        recipient_id: &str,
        cause: NotificationCause,
    ) -> Result<Notification, NotifyError> {
        let record = self
            .store
            .create(recipient_id, &cause)
            .await
            .map_err(|err| NotifyError::Store(err.to_string()))?;

        if let Err(err) = self.publish_wake(recipient_id).await {
            warn!(
                recipient = recipient_id,
                error = %err,
                "notification wake publish failed; recipient will catch up on the next poll"
            );
        } else {
            info!(recipient = recipient_id, "notification delivered");
        }

        Ok(record)
    }

    async fn publish_wake(&self, recipient_id: &str) -> Result<(), RealtimeError> {
        let connect_timeout = self.transport.config().connect_timeout;
        self.transport.ensure_connected(connect_timeout).await?;
        let session = ChannelSession::open_notifications(&self.transport, recipient_id).await?;
        session.publish(&WireEnvelope::wake(recipient_id)).await
    }

    /// A message landed in a conversation: notify the other participant.
    pub async fn message_sent(
        &self,
        conversation_id: &str,
        sender_id: &str,
    ) -> Result<Notification, NotifyError> {
        let conversation = self
            .directory
            .conversation(conversation_id)
            .await
            .map_err(|err| NotifyError::Directory(err.to_string()))?;
        let recipient = message_recipient(&conversation, sender_id)?;
        self.notify(
            recipient,
            NotificationCause::Conversation(conversation.id.clone()),
        )
        .await
    }

    /// A rental request changed status: notify whichever party the new status
    /// concerns.
    pub async fn rental_status_changed(
        &self,
        request_id: &str,
        status: RentalStatus,
    ) -> Result<Notification, NotifyError> {
        let request = self
            .directory
            .rental_request(request_id)
            .await
            .map_err(|err| NotifyError::Directory(err.to_string()))?;
        let recipient = rental_recipient(&request, status);
        self.notify(recipient, NotificationCause::Request(request.id.clone()))
            .await
    }

    /// Idempotent: marking an already-read notification succeeds again with
    /// `read=true`.
    pub async fn mark_read(&self, notification_id: &str) -> Result<Notification, NotifyError> {
        self.store
            .set_read(notification_id)
            .await
            .map_err(|err| NotifyError::Store(err.to_string()))
    }
}
