use cairn_types::api::{CreateNotification, NotificationRecord, UpdateNotification};
use cairn_types::models::{Notification, NotificationCause};

use crate::{Backend, BackendError, eq_filter, sort};

impl Backend {
    /// Create a durable, unread notification for one recipient. Exactly one
    /// cause reference is set.
    pub async fn create_notification(
        &self,
        recipient_id: &str,
        cause: &NotificationCause,
    ) -> Result<Notification, BackendError> {
        let (conversation, request) = match cause {
            NotificationCause::Conversation(id) => (Some(id.as_str()), None),
            NotificationCause::Request(id) => (None, Some(id.as_str())),
        };
        let payload = CreateNotification {
            client: recipient_id,
            conversation,
            request,
            read: false,
        };
        let record: NotificationRecord = self.create_item("notifications", &payload).await?;
        Ok(record.into())
    }

    /// A recipient's notifications, newest first.
    pub async fn notifications_for(
        &self,
        client_id: &str,
    ) -> Result<Vec<Notification>, BackendError> {
        let records: Vec<NotificationRecord> = self
            .get_items(
                "notifications",
                &[eq_filter("client", client_id), sort("-date_created")],
            )
            .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Idempotent by construction: the update always sets `read=true`, so
    /// repeating it is a no-op success.
    pub async fn set_notification_read(
        &self,
        notification_id: &str,
    ) -> Result<Notification, BackendError> {
        let payload = UpdateNotification { read: true };
        let record: NotificationRecord = self
            .update_item("notifications", notification_id, &payload)
            .await?;
        Ok(record.into())
    }
}
