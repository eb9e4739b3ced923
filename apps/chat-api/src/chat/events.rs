//! Wire-format frames: inbound command envelopes and outbound events.
//!
//! Both directions use a `{ "type": ..., "data": ... }` envelope. Inbound
//! payloads are validated into typed structs here, at the dispatch
//! boundary, so handlers never see untyped JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Raw inbound envelope, before the payload is validated.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub message: String,
    /// Explicit conversation to append to; when absent the sender's
    /// support conversation is resolved or created.
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDirectPayload {
    pub subscriber_email: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminBroadcastPayload {
    /// One of `all`, `verified`, `subscribed`, `specific`.
    pub recipients: String,
    pub message: String,
    #[serde(default)]
    pub specific_emails: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadPayload {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesPayload {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
    #[serde(default)]
    pub is_typing: bool,
}

/// A validated inbound command.
#[derive(Debug)]
pub enum ClientCommand {
    ChatMessage(ChatMessagePayload),
    AdminMessageSubscriber(AdminDirectPayload),
    AdminBroadcast(AdminBroadcastPayload),
    MarkRead(MarkReadPayload),
    GetConversations,
    GetMessages(GetMessagesPayload),
    Typing(TypingPayload),
}

/// Why a frame could not be turned into a [`ClientCommand`].
#[derive(Debug)]
pub enum ParseError {
    /// The `type` field names no known command. Logged and ignored.
    UnknownType(String),
    /// The payload does not match the command's expected shape.
    InvalidPayload(serde_json::Error),
}

impl ClientCommand {
    /// Validate a raw frame into a typed command.
    pub fn parse(frame: ClientFrame) -> Result<Self, ParseError> {
        fn payload<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, ParseError> {
            serde_json::from_value(data).map_err(ParseError::InvalidPayload)
        }

        match frame.kind.as_str() {
            "chat_message" => Ok(Self::ChatMessage(payload(frame.data)?)),
            "admin_message_subscriber" => Ok(Self::AdminMessageSubscriber(payload(frame.data)?)),
            "admin_broadcast" => Ok(Self::AdminBroadcast(payload(frame.data)?)),
            "mark_read" => Ok(Self::MarkRead(payload(frame.data)?)),
            "get_conversations" => Ok(Self::GetConversations),
            "get_messages" => Ok(Self::GetMessages(payload(frame.data)?)),
            "typing" => Ok(Self::Typing(payload(frame.data)?)),
            other => Err(ParseError::UnknownType(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Event names pushed to clients.
pub struct EventName;

impl EventName {
    pub const CONNECTION_ESTABLISHED: &'static str = "connection_established";
    pub const USER_CONNECTED: &'static str = "user_connected";
    pub const USER_DISCONNECTED: &'static str = "user_disconnected";
    pub const NEW_MESSAGE: &'static str = "new_message";
    pub const ADMIN_MESSAGE: &'static str = "admin_message";
    pub const BROADCAST_MESSAGE: &'static str = "broadcast_message";
    pub const SOUND_NOTIFICATION: &'static str = "sound_notification";
    pub const MESSAGE_SENT: &'static str = "message_sent";
    pub const BROADCAST_SENT: &'static str = "broadcast_sent";
    pub const MESSAGES_MARKED_READ: &'static str = "messages_marked_read";
    pub const CONVERSATIONS_LIST: &'static str = "conversations_list";
    pub const CONVERSATION_MESSAGES: &'static str = "conversation_messages";
    pub const TYPING_INDICATOR: &'static str = "typing_indicator";
    pub const ERROR: &'static str = "error";
}

/// An outbound event pushed over a connection.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: Value,
}

impl ServerEvent {
    pub fn new(kind: &'static str, data: Value) -> Self {
        Self { kind, data }
    }

    /// Build an `error` event with a human-readable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: EventName::ERROR,
            data: serde_json::json!({ "message": message.into() }),
        }
    }

    /// UI sound cue, decoupled from the message payload itself.
    pub fn sound(sound: &str, message: &str, conversation_id: &str) -> Self {
        Self {
            kind: EventName::SOUND_NOTIFICATION,
            data: serde_json::json!({
                "sound": sound,
                "message": message,
                "conversationId": conversation_id,
            }),
        }
    }
}

/// Minimal syntactic email check used to validate `specific` broadcast
/// lists before any state is mutated. Deliverability is not our problem;
/// obvious garbage is.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: &str, data: Value) -> ClientFrame {
        ClientFrame {
            kind: kind.to_string(),
            data,
        }
    }

    #[test]
    fn parses_chat_message_with_camel_case_fields() {
        let cmd = ClientCommand::parse(frame(
            "chat_message",
            serde_json::json!({
                "message": "hello",
                "ipAddress": "10.0.0.1",
                "userAgent": "test-agent"
            }),
        ))
        .unwrap();

        match cmd {
            ClientCommand::ChatMessage(p) => {
                assert_eq!(p.message, "hello");
                assert_eq!(p.ip_address.as_deref(), Some("10.0.0.1"));
                assert!(p.conversation_id.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_get_conversations_without_data() {
        let cmd = ClientCommand::parse(frame("get_conversations", Value::Null)).unwrap();
        assert!(matches!(cmd, ClientCommand::GetConversations));
    }

    #[test]
    fn unknown_type_is_distinguished_from_bad_payload() {
        let err = ClientCommand::parse(frame("launch_missiles", Value::Null)).unwrap_err();
        assert!(matches!(err, ParseError::UnknownType(t) if t == "launch_missiles"));

        let err =
            ClientCommand::parse(frame("mark_read", serde_json::json!({ "nope": 1 }))).unwrap_err();
        assert!(matches!(err, ParseError::InvalidPayload(_)));
    }

    #[test]
    fn parses_admin_broadcast_specific_list() {
        let cmd = ClientCommand::parse(frame(
            "admin_broadcast",
            serde_json::json!({
                "recipients": "specific",
                "message": "hi all",
                "specificEmails": ["a@b.com", "c@d.com"]
            }),
        ))
        .unwrap();

        match cmd {
            ClientCommand::AdminBroadcast(p) => {
                assert_eq!(p.recipients, "specific");
                assert_eq!(p.specific_emails.unwrap().len(), 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn server_event_envelope_shape() {
        let event = ServerEvent::new(
            EventName::MESSAGE_SENT,
            serde_json::json!({ "delivered": true }),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_sent");
        assert_eq!(json["data"]["delivered"], true);
    }

    #[test]
    fn email_validation_boundaries() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+tag@sub.example.co"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("alice@nodot"));
        assert!(!is_valid_email("alice@.com"));
        assert!(!is_valid_email("alice@example.com."));
        assert!(!is_valid_email("spaced name@example.com"));
    }
}
