//! Registry of live WebSocket connections.
//!
//! Uses `DashMap` for shard-level concurrency and `parking_lot::Mutex` per
//! entry for non-poisoning, fast locking. Admin connection ids are tracked
//! in a separate subset for fast fan-out.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::chat::events::ServerEvent;
use crate::models::connection::{ConnectionInfo, Role};

/// A registered connection: metadata plus the outbound channel drained by
/// the connection's own task. The channel handle never leaves the registry.
struct ConnectionEntry {
    role: Role,
    user_id: String,
    email: Option<String>,
    is_subscriber: bool,
    connected_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Aggregate connection counts for the statistics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionCounts {
    pub total: usize,
    pub admins: usize,
    pub users: usize,
    pub subscribers: usize,
}

pub struct ConnectionRegistry {
    connections: DashMap<String, Mutex<ConnectionEntry>>,
    admins: Mutex<HashSet<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            admins: Mutex::new(HashSet::new()),
        }
    }

    /// Register a new connection and return its fresh id.
    ///
    /// Never fails: the channel was just created by the connection task.
    pub fn register(
        &self,
        sender: mpsc::UnboundedSender<ServerEvent>,
        role: Role,
        user_id: String,
        email: Option<String>,
        is_subscriber: bool,
    ) -> String {
        let id = scribe_common::id::prefixed_ulid(scribe_common::id::prefix::CONNECTION);
        let now = Utc::now();
        let entry = ConnectionEntry {
            role,
            user_id,
            email,
            is_subscriber,
            connected_at: now,
            last_activity_at: now,
            sender,
        };
        self.connections.insert(id.clone(), Mutex::new(entry));
        if role == Role::Admin {
            self.admins.lock().insert(id.clone());
        }
        id
    }

    /// Remove a connection from the main map and the admin subset.
    /// Idempotent; unknown ids are a no-op.
    pub fn unregister(&self, id: &str) {
        self.connections.remove(id);
        self.admins.lock().remove(id);
    }

    /// Bump `last_activity_at`. Silent no-op if the connection already
    /// closed; an inbound frame can race the close handshake.
    pub fn touch(&self, id: &str) {
        if let Some(entry) = self.connections.get(id) {
            entry.lock().last_activity_at = Utc::now();
        }
    }

    /// First live connection whose identity email matches. `None` is an
    /// expected outcome (the target is simply offline), not an error.
    pub fn find_by_email(&self, email: &str) -> Option<String> {
        self.connections.iter().find_map(|entry| {
            let e = entry.value().lock();
            if e.email.as_deref() == Some(email) {
                Some(entry.key().clone())
            } else {
                None
            }
        })
    }

    /// Push an event to a connection if it is still open. Closed or
    /// unknown connections are silently skipped; delivery here is
    /// best-effort and callers never branch on it.
    pub fn send(&self, id: &str, event: ServerEvent) {
        if let Some(entry) = self.connections.get(id) {
            let e = entry.lock();
            // A send error means the receiver task already hung up.
            let _ = e.sender.send(event);
        }
    }

    /// Snapshot of currently-registered admin connection ids.
    pub fn admin_ids(&self) -> Vec<String> {
        self.admins.lock().iter().cloned().collect()
    }

    /// Metadata snapshot for one connection.
    pub fn connection(&self, id: &str) -> Option<ConnectionInfo> {
        self.connections.get(id).map(|entry| {
            let e = entry.lock();
            ConnectionInfo {
                id: id.to_string(),
                role: e.role,
                user_id: e.user_id.clone(),
                email: e.email.clone(),
                is_subscriber: e.is_subscriber,
                connected_at: e.connected_at,
                last_activity_at: e.last_activity_at,
            }
        })
    }

    /// Metadata snapshot of every live connection, for fan-out decisions.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|entry| {
                let e = entry.value().lock();
                ConnectionInfo {
                    id: entry.key().clone(),
                    role: e.role,
                    user_id: e.user_id.clone(),
                    email: e.email.clone(),
                    is_subscriber: e.is_subscriber,
                    connected_at: e.connected_at,
                    last_activity_at: e.last_activity_at,
                }
            })
            .collect()
    }

    pub fn counts(&self) -> ConnectionCounts {
        let total = self.connections.len();
        let admins = self.admins.lock().len();
        let subscribers = self
            .connections
            .iter()
            .filter(|entry| entry.value().lock().is_subscriber)
            .count();
        ConnectionCounts {
            total,
            admins,
            users: total - admins,
            subscribers,
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
