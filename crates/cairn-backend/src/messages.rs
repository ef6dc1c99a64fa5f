use chrono::{DateTime, Utc};

use cairn_types::api::{CreateMessage, MessageRecord};
use cairn_types::models::Message;
use cairn_types::wire::WireEnvelope;

use crate::{Backend, BackendError, eq_filter, gt_filter, sort};

impl Backend {
    /// Full durable history of a conversation, ascending by creation time.
    pub async fn fetch_message_history(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, BackendError> {
        let records: Vec<MessageRecord> = self
            .get_items(
                "messages",
                &[
                    eq_filter("conversation", conversation_id),
                    sort("date_created"),
                ],
            )
            .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Messages created strictly after `since` — the incremental catch-up
    /// variant used after a reconnect.
    pub async fn fetch_messages_since(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, BackendError> {
        let records: Vec<MessageRecord> = self
            .get_items(
                "messages",
                &[
                    eq_filter("conversation", conversation_id),
                    gt_filter("date_created", &since.to_rfc3339()),
                    sort("date_created"),
                ],
            )
            .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Persist the durable copy of a published envelope. The client-generated
    /// id becomes the record key; the backend assigns the authoritative
    /// timestamp.
    pub async fn persist_message(&self, envelope: &WireEnvelope) -> Result<Message, BackendError> {
        let payload = CreateMessage {
            id: &envelope.id,
            conversation: &envelope.conversation_id,
            sender: &envelope.sender_id,
            message: &envelope.message,
        };
        let record: MessageRecord = self.create_item("messages", &payload).await?;
        Ok(record.into())
    }
}
