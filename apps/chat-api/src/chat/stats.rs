//! Read-only statistics aggregate over the registry and store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chat::handler::ChatService;
use crate::chat::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ConnectionStats {
    pub total: usize,
    pub admins: usize,
    pub users: usize,
    pub subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct ConversationStats {
    pub total: usize,
    pub active: usize,
    pub support: usize,
    pub direct_message: usize,
    pub broadcast: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageStats {
    pub total: usize,
    pub unread: usize,
}

/// The admin console's chat dashboard payload. Pure read, no side effects.
#[derive(Debug, Serialize)]
pub struct ChatStatistics {
    pub connections: ConnectionStats,
    pub conversations: ConversationStats,
    pub messages: MessageStats,
    pub timestamp: DateTime<Utc>,
}

pub async fn collect(service: &ChatService) -> Result<ChatStatistics, StoreError> {
    let counts = service.registry.counts();
    let store = service.store.stats().await?;

    Ok(ChatStatistics {
        connections: ConnectionStats {
            total: counts.total,
            admins: counts.admins,
            users: counts.users,
            subscribers: counts.subscribers,
        },
        conversations: ConversationStats {
            total: store.total_conversations,
            active: store.active_conversations,
            support: store.support,
            direct_message: store.direct_message,
            broadcast: store.broadcast,
        },
        messages: MessageStats {
            total: store.total_messages,
            unread: store.unread_messages,
        },
        timestamp: Utc::now(),
    })
}
