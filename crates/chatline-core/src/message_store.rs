//! Ordered Message Storage
//!
//! Holds the canonical, duplicate-free sequence of messages sorted by creation
//! time. All mutation goes through [`MessageStore::insert_if_absent`] and
//! [`MessageStore::remove_by_id`], which are idempotent so redelivered feed
//! events and optimistic echoes collapse into a single entry.

use hashbrown::HashSet;
use tracing::{debug, warn};

use crate::errors::{ChatError, ChatResult};
use crate::types::{Message, MessageId};

// ----------------------------------------------------------------------------
// Message Store Implementation
// ----------------------------------------------------------------------------

/// Ordered message store with automatic deduplication
#[derive(Debug, Default)]
pub struct MessageStore {
    /// Messages sorted by `created_at`, ties in arrival order
    messages: Vec<Message>,
    /// Identifiers currently present in `messages`
    ids: HashSet<MessageId>,
    /// Set once any incremental mutation has happened
    mutated: bool,
    /// Statistics
    stats: MessageStoreStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStoreStats {
    pub inserted: usize,
    pub duplicates_ignored: usize,
    pub removed: usize,
    pub absent_removals: usize,
}

impl MessageStore {
    /// Create new empty message store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with the result of the initial bulk read
    ///
    /// Only valid before the first incremental mutation. Duplicate identifiers
    /// keep their first occurrence and the input is stably ordered by timestamp.
    pub fn seed(&mut self, messages: Vec<Message>) -> ChatResult<()> {
        if self.mutated {
            return Err(ChatError::invalid_state(
                "MessageStore",
                "no incremental mutation before seeding",
                format!(
                    "{} inserts and {} removals already applied",
                    self.stats.inserted, self.stats.removed
                ),
            ));
        }

        let mut ids = HashSet::with_capacity(messages.len());
        let mut seeded = Vec::with_capacity(messages.len());
        for message in messages {
            if ids.insert(message.id.clone()) {
                seeded.push(message);
            } else {
                warn!(id = %message.id, "Dropping duplicate row from bulk read");
            }
        }

        // Stable, so already-ordered input is untouched
        seeded.sort_by_key(|m| m.created_at);

        debug!(count = seeded.len(), "Seeded message store");
        self.messages = seeded;
        self.ids = ids;
        Ok(())
    }

    /// Insert a message unless one with the same identifier is present
    ///
    /// Returns `true` if the message was inserted.
    pub fn insert_if_absent(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            self.stats.duplicates_ignored += 1;
            debug!(id = %message.id, "Ignoring duplicate message");
            return false;
        }

        // First position whose timestamp is strictly later, so ties append
        let position = self
            .messages
            .partition_point(|existing| existing.created_at <= message.created_at);

        self.ids.insert(message.id.clone());
        self.messages.insert(position, message);
        self.mutated = true;
        self.stats.inserted += 1;
        true
    }

    /// Remove the message with the given identifier
    ///
    /// Returns `true` if a message was removed.
    pub fn remove_by_id(&mut self, id: &MessageId) -> bool {
        if !self.ids.remove(id) {
            self.stats.absent_removals += 1;
            debug!(id = %id, "Ignoring removal of absent message");
            return false;
        }

        self.messages.retain(|m| &m.id != id);
        self.mutated = true;
        self.stats.removed += 1;
        true
    }

    /// Ordered read-only view of the current messages
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        if !self.ids.contains(id) {
            return None;
        }
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether an incremental mutation has happened since creation
    pub fn has_mutated(&self) -> bool {
        self.mutated
    }

    pub fn stats(&self) -> &MessageStoreStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    fn message(id: i64, ts: i64) -> Message {
        Message::new(
            id,
            format!("message {}", id),
            "ada@example.com",
            Timestamp::from_micros(ts),
        )
    }

    fn ids(store: &MessageStore) -> Vec<String> {
        store
            .snapshot()
            .iter()
            .map(|m| m.id.to_string())
            .collect()
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut store = MessageStore::new();
        assert!(store.insert_if_absent(message(1, 10)));
        assert!(!store.insert_if_absent(message(1, 10)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().duplicates_ignored, 1);
    }

    #[test]
    fn test_insert_orders_by_timestamp() {
        let mut store = MessageStore::new();
        store.insert_if_absent(message(1, 30));
        store.insert_if_absent(message(2, 10));
        store.insert_if_absent(message(3, 20));
        assert_eq!(ids(&store), vec!["2", "3", "1"]);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut store = MessageStore::new();
        store.insert_if_absent(message(1, 10));
        store.insert_if_absent(message(2, 20));
        store.insert_if_absent(message(3, 10));
        store.insert_if_absent(message(4, 10));
        assert_eq!(ids(&store), vec!["1", "3", "4", "2"]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut store = MessageStore::new();
        store.seed(vec![message(1, 10)]).unwrap();
        assert!(!store.remove_by_id(&MessageId::from(99)));
        assert_eq!(ids(&store), vec!["1"]);
        assert_eq!(store.stats().absent_removals, 1);
        // An absent removal is not a mutation, so seeding is still allowed
        assert!(!store.has_mutated());
    }

    #[test]
    fn test_remove_present() {
        let mut store = MessageStore::new();
        store.seed(vec![message(1, 10), message(2, 20)]).unwrap();
        assert!(store.remove_by_id(&MessageId::from(1)));
        assert!(!store.contains(&MessageId::from(1)));
        assert!(!store.remove_by_id(&MessageId::from(1)));
        assert_eq!(ids(&store), vec!["2"]);
    }

    #[test]
    fn test_seed_after_mutation_fails() {
        let mut store = MessageStore::new();
        store.insert_if_absent(message(1, 10));
        let result = store.seed(vec![message(2, 20)]);
        assert!(matches!(result, Err(ChatError::InvalidState { .. })));
        assert_eq!(ids(&store), vec!["1"]);
    }

    #[test]
    fn test_seed_drops_duplicates_and_orders() {
        let mut store = MessageStore::new();
        store
            .seed(vec![message(2, 20), message(1, 10), message(2, 20)])
            .unwrap();
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert_eq!(store.get(&MessageId::from(2)).unwrap().created_at.as_micros(), 20);
    }

    #[test]
    fn test_reseed_before_mutation_replaces() {
        let mut store = MessageStore::new();
        store.seed(vec![message(1, 10)]).unwrap();
        store.seed(vec![message(2, 20)]).unwrap();
        assert_eq!(ids(&store), vec!["2"]);
        assert!(!store.contains(&MessageId::from(1)));
    }
}
