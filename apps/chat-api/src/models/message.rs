use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Notification,
    System,
}

/// Free-form per-message metadata captured at send time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Shared id across every message of one admin broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_id: Option<String>,
    /// The recipients filter the broadcast was sent with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_filter: Option<String>,
}

/// One chat entry. Immutable after append except for `is_read`, which
/// only ever transitions false → true.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(rename = "senderType")]
    pub sender_role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(rename = "message")]
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "messageType")]
    pub kind: MessageKind,
    pub is_read: bool,
    pub metadata: MessageMetadata,
}

impl ChatMessage {
    /// A text message, unread, timestamped now.
    pub fn text(
        conversation_id: String,
        sender_id: String,
        sender_role: Role,
        sender_email: Option<String>,
        body: String,
    ) -> Self {
        Self {
            id: scribe_common::id::prefixed_ulid(scribe_common::id::prefix::MESSAGE),
            conversation_id,
            sender_id,
            sender_role,
            sender_email,
            recipient_email: None,
            body,
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            is_read: false,
            metadata: MessageMetadata::default(),
        }
    }
}
