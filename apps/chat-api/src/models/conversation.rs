use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of thread a conversation is. Determines the lookup key:
/// at most one active conversation exists per (participant email, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Support,
    DirectMessage,
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Closed,
    Archived,
}

/// A thread of messages between a participant set.
///
/// Status transitions are a hook point for external moderation tooling;
/// this core only ever creates conversations as `Active` and never
/// deletes them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    /// User ids of the participants.
    pub participants: Vec<String>,
    /// Email addresses of the participants; this is what the delivery
    /// engine matches live connections against.
    pub participant_emails: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub unread_count: usize,
    pub tags: Vec<String>,
}

impl Conversation {
    /// A fresh active conversation for a single participant.
    pub fn new(id: String, user_id: String, email: String, kind: ConversationKind) -> Self {
        let now = Utc::now();
        Self {
            id,
            participants: vec![user_id],
            participant_emails: vec![email],
            kind,
            status: ConversationStatus::Active,
            created_at: now,
            last_activity: now,
            unread_count: 0,
            tags: Vec::new(),
        }
    }
}
