//! Decides which live connections receive an outbound event.
//!
//! Delivery is strictly best-effort and synchronous with respect to
//! currently-open connections: an offline recipient simply never receives
//! the event. There is no retry and no durable queue; callers that care
//! get a delivered count and nothing more.

use std::sync::Arc;

use crate::chat::events::ServerEvent;
use crate::chat::registry::ConnectionRegistry;
use crate::chat::store::ChatStore;
use crate::models::connection::ConnectionInfo;

/// Result of a fan-out to a set of target emails. `delivered` counts
/// live-socket deliveries only and never exceeds `requested`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub requested: usize,
    pub delivered: usize,
}

/// The core fan-out predicate: a connection observes a conversation when
/// its email is in the participant set, or when it is an admin. Admins
/// monitor all support traffic live without being formal participants.
pub fn is_conversation_audience(conn: &ConnectionInfo, participant_emails: &[String]) -> bool {
    if conn.is_admin() {
        return true;
    }
    match conn.email.as_deref() {
        Some(email) => participant_emails.iter().any(|p| p == email),
        None => false,
    }
}

pub struct DeliveryEngine {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn ChatStore>,
}

impl DeliveryEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn ChatStore>) -> Self {
        Self { registry, store }
    }

    /// Direct delegation to the registry.
    pub fn to_connection(&self, connection_id: &str, event: ServerEvent) {
        self.registry.send(connection_id, event);
    }

    /// Deliver to every live connection in the conversation's audience
    /// (participants plus all admins). Unknown conversations deliver to
    /// nobody.
    pub async fn to_conversation_participants(&self, conversation_id: &str, event: ServerEvent) {
        let Ok(Some(conversation)) = self.store.conversation(conversation_id).await else {
            return;
        };
        for conn in self.registry.connections() {
            if is_conversation_audience(&conn, &conversation.participant_emails) {
                self.registry.send(&conn.id, event.clone());
            }
        }
    }

    /// Deliver to every currently-registered admin connection.
    pub fn to_all_admins(&self, event: ServerEvent) {
        for id in self.registry.admin_ids() {
            self.registry.send(&id, event.clone());
        }
    }

    /// Per-recipient fan-out: each target email with a live connection
    /// receives the events built by `events_for` and counts as delivered;
    /// offline targets are skipped and not counted.
    pub fn broadcast<F>(&self, target_emails: &[String], mut events_for: F) -> BroadcastOutcome
    where
        F: FnMut(&str) -> Vec<ServerEvent>,
    {
        let mut delivered = 0;
        for email in target_emails {
            if let Some(connection_id) = self.registry.find_by_email(email) {
                for event in events_for(email) {
                    self.registry.send(&connection_id, event);
                }
                delivered += 1;
            }
        }
        BroadcastOutcome {
            requested: target_emails.len(),
            delivered,
        }
    }
}
