use std::collections::HashSet;

use cairn_types::models::Message;

/// Combine durable history with the live list into the authoritative ordered
/// view of a conversation.
///
/// Duplicates are removed by message id, first occurrence winning, then the
/// result is sorted ascending by creation timestamp. The sort is stable, so
/// equal timestamps keep their insertion order and re-merging an output with
/// itself is a no-op.
pub fn merge_messages(durable: &[Message], live: &[Message]) -> Vec<Message> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(durable.len() + live.len());
    let mut merged: Vec<Message> = Vec::with_capacity(durable.len() + live.len());

    for message in durable.iter().chain(live) {
        if seen.insert(&message.id) {
            merged.push(message.clone());
        }
    }

    merged.sort_by_key(|m| m.created_at);
    merged
}

/// The live side of a conversation: envelopes received over the subscription
/// plus optimistic local sends, with local-echo suppression.
///
/// Owned by exactly one open conversation view; never shared across
/// conversations.
#[derive(Debug, Default)]
pub struct LiveBuffer {
    messages: Vec<Message>,
    /// Ids of locally published messages whose provider echo has not arrived
    /// yet. Entries are removed when the echo comes back, bounding the set.
    sent: HashSet<String>,
}

impl LiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimistically append a message the local user just published.
    pub fn record_sent(&mut self, message: Message) {
        self.sent.insert(message.id.clone());
        self.messages.push(message);
    }

    /// Feed an inbound envelope through the dedup rules. Returns `true` when
    /// the message was new and appended.
    pub fn observe(&mut self, message: Message) -> bool {
        // Our own publish coming back through the subscription.
        if self.sent.remove(&message.id) {
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// The publish failed; the echo will never arrive.
    pub fn forget_sent(&mut self, id: &str) -> bool {
        self.sent.remove(id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of sends still awaiting their echo.
    pub fn pending_sent(&self) -> usize {
        self.sent.len()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn msg(id: &str, seconds: i64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            body: format!("body of {id}"),
            created_at: Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
                + Duration::seconds(seconds),
        }
    }

    #[test]
    fn each_id_appears_exactly_once() {
        let durable = vec![msg("m1", 0), msg("m2", 1)];
        let live = vec![msg("m2", 1), msg("m3", 2), msg("m1", 0)];

        let merged = merge_messages(&durable, &live);
        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn merge_is_idempotent_on_its_own_output() {
        let durable = vec![msg("m2", 5), msg("m1", 1)];
        let live = vec![msg("m3", 3), msg("m2", 5)];

        let once = merge_messages(&durable, &live);
        let twice = merge_messages(&once, &[]);

        let a: Vec<(&str, _)> = once.iter().map(|m| (m.id.as_str(), m.created_at)).collect();
        let b: Vec<(&str, _)> = twice.iter().map(|m| (m.id.as_str(), m.created_at)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn ordered_by_timestamp_regardless_of_arrival_order() {
        // Provider delivery order is not creation order across senders.
        let durable = vec![msg("m3", 30)];
        let live = vec![msg("m2", 20), msg("m1", 10)];

        let merged = merge_messages(&durable, &live);
        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let durable = vec![msg("a", 7), msg("b", 7)];
        let live = vec![msg("c", 7)];

        let merged = merge_messages(&durable, &live);
        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        // Deterministic for a given merge: same inputs, same order.
        let again = merge_messages(&durable, &live);
        let ids_again: Vec<&str> = again.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ids_again);
    }

    #[test]
    fn first_occurrence_wins_on_duplicate_ids() {
        let mut durable_copy = msg("m1", 0);
        durable_copy.body = "durable".to_string();
        let mut live_copy = msg("m1", 0);
        live_copy.body = "live".to_string();

        let merged = merge_messages(&[durable_copy], &[live_copy]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].body, "durable");
    }

    #[test]
    fn local_echo_is_suppressed_and_bounded() {
        let mut live = LiveBuffer::new();
        live.record_sent(msg("m1", 0));
        assert_eq!(live.pending_sent(), 1);

        // The provider echoes our own publish back; it must not duplicate and
        // the sent set must shrink.
        assert!(!live.observe(msg("m1", 0)));
        assert_eq!(live.messages().len(), 1);
        assert_eq!(live.pending_sent(), 0);

        // A second delivery of the same id (multi-tab, provider retry) is
        // caught by the live-list check.
        assert!(!live.observe(msg("m1", 0)));
        assert_eq!(live.messages().len(), 1);
    }

    #[test]
    fn remote_messages_are_appended_once() {
        let mut live = LiveBuffer::new();
        assert!(live.observe(msg("m9", 3)));
        assert!(!live.observe(msg("m9", 3)));
        assert_eq!(live.messages().len(), 1);
    }

    #[test]
    fn forget_sent_clears_a_failed_publish() {
        let mut live = LiveBuffer::new();
        live.record_sent(msg("m1", 0));
        assert!(live.forget_sent("m1"));
        assert_eq!(live.pending_sent(), 0);
        // The optimistic entry itself stays; rollback is the caller's call.
        assert_eq!(live.messages().len(), 1);
    }
}
