//! Ordered, deduplicated view of the chat.

use super::message::ChatMessage;

/// Messages ordered by `(sent_at, id)`, deduplicated by id.
///
/// Deduplication is what lets the login-time history fetch, the live
/// subscription and locally staged sends all flow into one list without
/// the same row showing twice.
#[derive(Debug, Clone, Default)]
pub struct ChatFeed {
    messages: Vec<ChatMessage>,
}

impl ChatFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a history fetch. Order of the input does not matter.
    pub fn from_history(history: Vec<ChatMessage>) -> Self {
        let mut feed = Self::new();
        for message in history {
            feed.push(message);
        }
        feed
    }

    /// Insert in timestamp order. Returns `false` when a message with the
    /// same id is already present.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| (m.sent_at, m.id) <= (message.sent_at, message.id));
        self.messages.insert(at, message);
        true
    }

    /// Swap a staged message for the backend-confirmed row. If the live
    /// feed already delivered the confirmed row, the swap just removes
    /// the staged copy.
    pub fn confirm(&mut self, provisional_id: i64, confirmed: ChatMessage) {
        self.remove(provisional_id);
        self.push(confirmed);
    }

    pub fn remove(&mut self, id: i64) -> Option<ChatMessage> {
        let at = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(at))
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn msg(id: i64, sent_at: i64) -> ChatMessage {
        ChatMessage::new(id, UserId::new("u-1"), format!("m{id}"), sent_at)
    }

    #[test]
    fn test_push_keeps_timestamp_order() {
        let mut feed = ChatFeed::new();
        feed.push(msg(2, 20));
        feed.push(msg(1, 10));
        feed.push(msg(3, 30));

        let ids: Vec<i64> = feed.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(feed.last().unwrap().id, 3);
    }

    #[test]
    fn test_push_rejects_duplicate_ids() {
        let mut feed = ChatFeed::new();
        assert!(feed.push(msg(1, 10)));
        assert!(!feed.push(msg(1, 99)));
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.messages()[0].sent_at, 10);
    }

    #[test]
    fn test_equal_timestamps_order_by_id() {
        let mut feed = ChatFeed::new();
        feed.push(msg(5, 10));
        feed.push(msg(4, 10));
        let ids: Vec<i64> = feed.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn test_from_history_sorts_input() {
        let feed = ChatFeed::from_history(vec![msg(3, 30), msg(1, 10), msg(2, 20)]);
        let ids: Vec<i64> = feed.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_confirm_swaps_provisional() {
        let mut feed = ChatFeed::new();
        feed.push(msg(-1, 10));
        feed.confirm(-1, msg(7, 10));

        let ids: Vec<i64> = feed.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn test_confirm_after_live_delivery_does_not_duplicate() {
        let mut feed = ChatFeed::new();
        feed.push(msg(-1, 10));
        // live subscription beat the confirmation
        feed.push(msg(7, 10));
        feed.confirm(-1, msg(7, 10));

        let ids: Vec<i64> = feed.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn test_remove_missing_id_is_noop() {
        let mut feed = ChatFeed::new();
        feed.push(msg(1, 10));
        assert!(feed.remove(99).is_none());
        assert_eq!(feed.len(), 1);
    }
}
