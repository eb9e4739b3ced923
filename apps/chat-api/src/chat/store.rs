//! Conversation store and per-conversation message log.
//!
//! `ChatStore` is the seam for a future durable backend; `MemoryChatStore`
//! is the reference implementation and keeps everything in process memory,
//! so chat history is lost on restart. There is no outbox or queue layer
//! in this service.

use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::models::conversation::{Conversation, ConversationKind, ConversationStatus};
use crate::models::message::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced conversation does not exist.
    NotFound,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "conversation not found"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Aggregate conversation/message counts for the statistics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_conversations: usize,
    pub active_conversations: usize,
    pub support: usize,
    pub direct_message: usize,
    pub broadcast: usize,
    pub total_messages: usize,
    pub unread_messages: usize,
}

/// Abstraction over conversation + message persistence.
///
/// Backed by process memory today; a database-backed implementation can be
/// substituted without changing any handler contract.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Return the conversation id for (email, kind), creating an empty
    /// active conversation if none exists. At most one conversation ever
    /// exists per (email, kind) pair, no matter how many callers race.
    async fn get_or_create(
        &self,
        user_id: &str,
        email: &str,
        kind: ConversationKind,
    ) -> Result<String, StoreError>;

    /// Append a message, bump `last_activity` to the message timestamp and
    /// increment the unread count.
    async fn append(&self, conversation_id: &str, message: ChatMessage) -> Result<(), StoreError>;

    /// Mark every unread message read. Returns how many transitioned.
    /// Unknown conversations yield 0, not an error.
    async fn mark_read(&self, conversation_id: &str) -> Result<usize, StoreError>;

    /// Conversations visible to a caller: all of them for admins, only
    /// those containing the caller's email otherwise. Most recent
    /// activity first.
    async fn list_for_participant(
        &self,
        email: Option<&str>,
        is_admin: bool,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Full log in append order; empty for unknown conversations.
    async fn messages_of(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    /// Metadata snapshot, primarily for the delivery engine's
    /// participant predicate.
    async fn conversation(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Log and metadata live behind one mutex so append and mark_read can
/// never desync the unread count.
struct ConversationEntry {
    conversation: Conversation,
    messages: Vec<ChatMessage>,
}

pub struct MemoryChatStore {
    conversations: DashMap<String, Mutex<ConversationEntry>>,
    /// (participant email, kind) → conversation id. The `entry` API makes
    /// get-or-create race-free.
    by_key: DashMap<(String, ConversationKind), String>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self {
            conversations: DashMap::new(),
            by_key: DashMap::new(),
        }
    }
}

impl Default for MemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn get_or_create(
        &self,
        user_id: &str,
        email: &str,
        kind: ConversationKind,
    ) -> Result<String, StoreError> {
        let id = self
            .by_key
            .entry((email.to_string(), kind))
            .or_insert_with(|| {
                let id =
                    scribe_common::id::prefixed_ulid(scribe_common::id::prefix::CONVERSATION);
                let conversation = Conversation::new(
                    id.clone(),
                    user_id.to_string(),
                    email.to_string(),
                    kind,
                );
                self.conversations.insert(
                    id.clone(),
                    Mutex::new(ConversationEntry {
                        conversation,
                        messages: Vec::new(),
                    }),
                );
                id
            })
            .clone();
        Ok(id)
    }

    async fn append(&self, conversation_id: &str, message: ChatMessage) -> Result<(), StoreError> {
        let entry = self
            .conversations
            .get(conversation_id)
            .ok_or(StoreError::NotFound)?;
        let mut e = entry.lock();
        e.conversation.last_activity = message.timestamp;
        e.conversation.unread_count += 1;
        e.messages.push(message);
        Ok(())
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<usize, StoreError> {
        let Some(entry) = self.conversations.get(conversation_id) else {
            return Ok(0);
        };
        let mut e = entry.lock();
        let mut marked = 0;
        for msg in e.messages.iter_mut() {
            if !msg.is_read {
                msg.is_read = true;
                marked += 1;
            }
        }
        // The count never goes negative even if it drifted from the log.
        e.conversation.unread_count = e.conversation.unread_count.saturating_sub(marked);
        Ok(marked)
    }

    async fn list_for_participant(
        &self,
        email: Option<&str>,
        is_admin: bool,
    ) -> Result<Vec<Conversation>, StoreError> {
        let mut result: Vec<Conversation> = self
            .conversations
            .iter()
            .filter_map(|entry| {
                let e = entry.value().lock();
                let visible = is_admin
                    || email.is_some_and(|email| {
                        e.conversation
                            .participant_emails
                            .iter()
                            .any(|p| p == email)
                    });
                visible.then(|| e.conversation.clone())
            })
            .collect();
        result.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(result)
    }

    async fn messages_of(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .conversations
            .get(conversation_id)
            .map(|entry| entry.lock().messages.clone())
            .unwrap_or_default())
    }

    async fn conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .conversations
            .get(conversation_id)
            .map(|entry| entry.lock().conversation.clone()))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        for entry in self.conversations.iter() {
            let e = entry.value().lock();
            stats.total_conversations += 1;
            if e.conversation.status == ConversationStatus::Active {
                stats.active_conversations += 1;
            }
            match e.conversation.kind {
                ConversationKind::Support => stats.support += 1,
                ConversationKind::DirectMessage => stats.direct_message += 1,
                ConversationKind::Broadcast => stats.broadcast += 1,
            }
            stats.total_messages += e.messages.len();
            stats.unread_messages += e.messages.iter().filter(|m| !m.is_read).count();
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::models::connection::Role;

    fn message(conversation_id: &str, body: &str) -> ChatMessage {
        ChatMessage::text(
            conversation_id.to_string(),
            "u1".to_string(),
            Role::User,
            Some("alice@example.com".to_string()),
            body.to_string(),
        )
    }

    #[tokio::test]
    async fn get_or_create_returns_same_id_for_same_key() {
        let store = MemoryChatStore::new();
        let a = store
            .get_or_create("u1", "alice@example.com", ConversationKind::Support)
            .await
            .unwrap();
        let b = store
            .get_or_create("u1", "alice@example.com", ConversationKind::Support)
            .await
            .unwrap();
        assert_eq!(a, b);

        // A different kind for the same email is a different conversation.
        let c = store
            .get_or_create("u1", "alice@example.com", ConversationKind::Broadcast)
            .await
            .unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_get_or_create_never_duplicates() {
        let store = Arc::new(MemoryChatStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .get_or_create("u1", "alice@example.com", ConversationKind::Support)
                    .await
                    .unwrap()
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.stats().await.unwrap().total_conversations, 1);
    }

    #[tokio::test]
    async fn append_updates_activity_and_unread_count() {
        let store = MemoryChatStore::new();
        let id = store
            .get_or_create("u1", "alice@example.com", ConversationKind::Support)
            .await
            .unwrap();

        store.append(&id, message(&id, "one")).await.unwrap();
        store.append(&id, message(&id, "two")).await.unwrap();

        let conv = store.conversation(&id).await.unwrap().unwrap();
        assert_eq!(conv.unread_count, 2);

        let messages = store.messages_of(&id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "one");
        assert_eq!(messages[1].body, "two");
        assert_eq!(conv.last_activity, messages[1].timestamp);
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_fails() {
        let store = MemoryChatStore::new();
        let err = store
            .append("conv_ghost", message("conv_ghost", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_clamps() {
        let store = MemoryChatStore::new();
        let id = store
            .get_or_create("u1", "alice@example.com", ConversationKind::Support)
            .await
            .unwrap();
        for i in 0..3 {
            store.append(&id, message(&id, &format!("m{i}"))).await.unwrap();
        }

        assert_eq!(store.mark_read(&id).await.unwrap(), 3);
        assert_eq!(store.conversation(&id).await.unwrap().unwrap().unread_count, 0);

        // Second call with no intervening append marks nothing.
        assert_eq!(store.mark_read(&id).await.unwrap(), 0);
        assert_eq!(store.conversation(&id).await.unwrap().unwrap().unread_count, 0);

        // Unknown conversation degrades to 0, not an error.
        assert_eq!(store.mark_read("conv_ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unread_count_matches_unread_messages_after_interleaving() {
        let store = MemoryChatStore::new();
        let id = store
            .get_or_create("u1", "alice@example.com", ConversationKind::Support)
            .await
            .unwrap();

        store.append(&id, message(&id, "a")).await.unwrap();
        store.mark_read(&id).await.unwrap();
        store.append(&id, message(&id, "b")).await.unwrap();
        store.append(&id, message(&id, "c")).await.unwrap();

        let conv = store.conversation(&id).await.unwrap().unwrap();
        let unread = store
            .messages_of(&id)
            .await
            .unwrap()
            .iter()
            .filter(|m| !m.is_read)
            .count();
        assert_eq!(conv.unread_count, unread);
        assert_eq!(unread, 2);
    }

    #[tokio::test]
    async fn list_for_participant_scopes_by_role() {
        let store = MemoryChatStore::new();
        let alice = store
            .get_or_create("u1", "alice@example.com", ConversationKind::Support)
            .await
            .unwrap();
        let bob = store
            .get_or_create("u2", "bob@example.com", ConversationKind::Support)
            .await
            .unwrap();

        let all = store.list_for_participant(None, true).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = store
            .list_for_participant(Some("alice@example.com"), false)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, alice);

        let nobody = store
            .list_for_participant(Some("carol@example.com"), false)
            .await
            .unwrap();
        assert!(nobody.is_empty());

        // Recency ordering: touch bob's conversation and it sorts first.
        store.append(&bob, message(&bob, "hi")).await.unwrap();
        let all = store.list_for_participant(None, true).await.unwrap();
        assert_eq!(all[0].id, bob);
    }

    #[tokio::test]
    async fn messages_of_unknown_conversation_is_empty() {
        let store = MemoryChatStore::new();
        assert!(store.messages_of("conv_ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_aggregate_counts_by_kind_and_read_state() {
        let store = MemoryChatStore::new();
        let support = store
            .get_or_create("u1", "alice@example.com", ConversationKind::Support)
            .await
            .unwrap();
        store
            .get_or_create("u2", "bob@example.com", ConversationKind::DirectMessage)
            .await
            .unwrap();

        store.append(&support, message(&support, "a")).await.unwrap();
        store.append(&support, message(&support, "b")).await.unwrap();
        store.mark_read(&support).await.unwrap();
        store.append(&support, message(&support, "c")).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.active_conversations, 2);
        assert_eq!(stats.support, 1);
        assert_eq!(stats.direct_message, 1);
        assert_eq!(stats.broadcast, 0);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.unread_messages, 1);
    }
}
