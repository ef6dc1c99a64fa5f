use cairn_types::api::{ConversationRecord, CreateConversation};
use cairn_types::models::Conversation;

use crate::{Backend, BackendError, sort};

/// Symmetric participant filter: the conversation belongs to a user if they
/// are either participant.
pub(crate) fn participant_filter(client_id: &str) -> String {
    serde_json::json!({
        "_or": [
            { "user_1": { "_eq": client_id } },
            { "user_2": { "_eq": client_id } },
        ]
    })
    .to_string()
}

/// Pair lookup, symmetric in the two users, pinned to one gear listing.
pub(crate) fn pair_filter(user_a: &str, user_b: &str, gear_listing: &str) -> String {
    serde_json::json!({
        "_and": [
            {
                "_or": [
                    { "user_1": { "_eq": user_a }, "user_2": { "_eq": user_b } },
                    { "user_1": { "_eq": user_b }, "user_2": { "_eq": user_a } },
                ]
            },
            { "gear_listing": { "_eq": gear_listing } },
        ]
    })
    .to_string()
}

impl Backend {
    pub async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Conversation, BackendError> {
        let record: ConversationRecord = self.get_item("conversations", conversation_id).await?;
        Ok(record.into())
    }

    /// All conversations a user participates in, newest listing first.
    pub async fn user_conversations(
        &self,
        client_id: &str,
    ) -> Result<Vec<Conversation>, BackendError> {
        let records: Vec<ConversationRecord> = self
            .get_items(
                "conversations",
                &[
                    ("filter".to_string(), participant_filter(client_id)),
                    sort("-id"),
                ],
            )
            .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    /// An existing conversation between two users about one listing, if any.
    pub async fn find_conversation(
        &self,
        user_a: &str,
        user_b: &str,
        gear_listing: &str,
    ) -> Result<Option<Conversation>, BackendError> {
        let records: Vec<ConversationRecord> = self
            .get_items(
                "conversations",
                &[
                    (
                        "filter".to_string(),
                        pair_filter(user_a, user_b, gear_listing),
                    ),
                    ("limit".to_string(), "1".to_string()),
                ],
            )
            .await?;
        Ok(records.into_iter().next().map(Into::into))
    }

    pub async fn create_conversation(
        &self,
        user_1: &str,
        user_2: &str,
        gear_listing: &str,
    ) -> Result<Conversation, BackendError> {
        let payload = CreateConversation {
            user_1,
            user_2,
            gear_listing,
        };
        let record: ConversationRecord = self.create_item("conversations", &payload).await?;
        Ok(record.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_filter_is_symmetric_in_shape() {
        let filter: serde_json::Value =
            serde_json::from_str(&participant_filter("alice")).unwrap();
        let arms = filter["_or"].as_array().unwrap();
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[0]["user_1"]["_eq"], "alice");
        assert_eq!(arms[1]["user_2"]["_eq"], "alice");
    }

    #[test]
    fn pair_filter_covers_both_orientations() {
        let filter: serde_json::Value =
            serde_json::from_str(&pair_filter("alice", "bob", "tent-42")).unwrap();
        let arms = filter["_and"][0]["_or"].as_array().unwrap();
        assert_eq!(arms[0]["user_1"]["_eq"], "alice");
        assert_eq!(arms[0]["user_2"]["_eq"], "bob");
        assert_eq!(arms[1]["user_1"]["_eq"], "bob");
        assert_eq!(arms[1]["user_2"]["_eq"], "alice");
        assert_eq!(filter["_and"][1]["gear_listing"]["_eq"], "tent-42");
    }
}
