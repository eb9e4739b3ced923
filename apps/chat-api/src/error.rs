use std::fmt;

use crate::chat::events::ServerEvent;

/// Application-level error raised while handling a chat command.
///
/// Every variant converts into an `error` event sent to the originating
/// connection only; nothing here ever tears down the connection or the
/// shared stores.
#[derive(Debug)]
pub enum ChatError {
    /// Malformed or semantically invalid payload. No state was mutated.
    Validation(String),
    /// A non-admin attempted an admin-only command.
    AdminRequired,
    /// A referenced entity does not exist where existence is required.
    NotFound(String),
    /// Anything unexpected; logged and surfaced generically.
    Internal(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The `error` event delivered to the caller.
    pub fn event(&self) -> ServerEvent {
        match self {
            ChatError::Validation(msg) => ServerEvent::error(msg.clone()),
            ChatError::AdminRequired => ServerEvent::error("Admin access required"),
            ChatError::NotFound(msg) => ServerEvent::error(msg.clone()),
            // Internal detail stays in the logs, not on the wire.
            ChatError::Internal(_) => ServerEvent::error("An internal error occurred"),
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Validation(msg) => write!(f, "validation error: {msg}"),
            ChatError::AdminRequired => write!(f, "admin access required"),
            ChatError::NotFound(msg) => write!(f, "not found: {msg}"),
            ChatError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<crate::chat::store::StoreError> for ChatError {
    fn from(err: crate::chat::store::StoreError) -> Self {
        match err {
            crate::chat::store::StoreError::NotFound => {
                ChatError::not_found("Conversation not found")
            }
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::internal(format!("serialization failed: {err}"))
    }
}
