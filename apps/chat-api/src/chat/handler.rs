//! Command dispatch and handlers: the session protocol's brain.
//!
//! Each inbound frame is parsed into a typed command and handled as a
//! short unit of work against the shared registry/store, with resulting
//! events pushed back out through the delivery engine. A failure while
//! handling one command becomes an `error` event to the originating
//! connection and nothing else.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::chat::delivery::DeliveryEngine;
use crate::chat::events::{
    is_valid_email, AdminBroadcastPayload, AdminDirectPayload, ChatMessagePayload, ClientCommand,
    ClientFrame, EventName, GetMessagesPayload, MarkReadPayload, ParseError, ServerEvent,
    TypingPayload,
};
use crate::chat::registry::ConnectionRegistry;
use crate::chat::store::ChatStore;
use crate::directory::{RecipientFilter, SubscriberDirectory};
use crate::error::ChatError;
use crate::models::connection::{ConnectionInfo, Role};
use crate::models::conversation::ConversationKind;
use crate::models::message::{ChatMessage, MessageMetadata};

/// The chat core: registry, store, directory and delivery engine wired
/// together. Owned by `AppState`; tests instantiate isolated copies.
pub struct ChatService {
    pub registry: Arc<ConnectionRegistry>,
    pub store: Arc<dyn ChatStore>,
    pub directory: Arc<dyn SubscriberDirectory>,
    pub delivery: DeliveryEngine,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, directory: Arc<dyn SubscriberDirectory>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let delivery = DeliveryEngine::new(registry.clone(), store.clone());
        Self {
            registry,
            store,
            directory,
            delivery,
        }
    }

    // -----------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------

    /// Register a freshly-opened connection: classify the subscriber,
    /// greet the client, announce the join to admins.
    pub async fn connect(
        &self,
        sender: mpsc::UnboundedSender<ServerEvent>,
        role: Role,
        user_id: String,
        email: Option<String>,
    ) -> ConnectionInfo {
        // A directory failure means "not a subscriber", never a refusal.
        let is_subscriber = match (&email, role) {
            (Some(email), r) if r != Role::Admin => self.directory.is_known_subscriber(email).await,
            _ => false,
        };

        let connected_at = Utc::now();
        let id = self
            .registry
            .register(sender, role, user_id.clone(), email.clone(), is_subscriber);

        self.delivery.to_connection(
            &id,
            ServerEvent::new(
                EventName::CONNECTION_ESTABLISHED,
                serde_json::json!({
                    "clientId": id,
                    "userType": role,
                    "isSubscriber": is_subscriber,
                    "serverTime": Utc::now(),
                }),
            ),
        );

        if role != Role::Admin {
            self.delivery.to_all_admins(ServerEvent::new(
                EventName::USER_CONNECTED,
                serde_json::json!({
                    "userId": user_id,
                    "userType": role,
                    "email": email,
                    "isSubscriber": is_subscriber,
                    "timestamp": Utc::now(),
                }),
            ));
        }

        tracing::info!(
            conn_id = %id,
            ?role,
            subscriber = is_subscriber,
            "chat connection established"
        );

        ConnectionInfo {
            id,
            role,
            user_id,
            email,
            is_subscriber,
            connected_at,
            last_activity_at: connected_at,
        }
    }

    /// Tear down a connection on close or transport error.
    pub fn disconnect(&self, connection_id: &str) {
        let Some(conn) = self.registry.connection(connection_id) else {
            return;
        };

        self.registry.unregister(connection_id);

        if conn.role != Role::Admin {
            self.delivery.to_all_admins(ServerEvent::new(
                EventName::USER_DISCONNECTED,
                serde_json::json!({
                    "userId": conn.user_id,
                    "userType": conn.role,
                    "email": conn.email,
                    "timestamp": Utc::now(),
                }),
            ));
        }

        tracing::info!(conn_id = %connection_id, role = ?conn.role, "chat connection closed");
    }

    // -----------------------------------------------------------------
    // Frame dispatch
    // -----------------------------------------------------------------

    /// Process one inbound text frame. Frames from already-closed
    /// connections are ignored; every failure is reported to the sender
    /// only and the connection stays open.
    pub async fn handle_frame(&self, connection_id: &str, text: &str) {
        let Some(conn) = self.registry.connection(connection_id) else {
            return;
        };
        self.registry.touch(connection_id);

        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(conn_id = %connection_id, ?err, "unparseable frame");
                self.delivery
                    .to_connection(connection_id, ServerEvent::error("Invalid message format"));
                return;
            }
        };

        let command = match ClientCommand::parse(frame) {
            Ok(command) => command,
            Err(ParseError::UnknownType(kind)) => {
                tracing::debug!(conn_id = %connection_id, %kind, "unknown command type");
                return;
            }
            Err(ParseError::InvalidPayload(err)) => {
                tracing::debug!(conn_id = %connection_id, ?err, "invalid command payload");
                self.delivery
                    .to_connection(connection_id, ServerEvent::error("Invalid message payload"));
                return;
            }
        };

        let result = match command {
            ClientCommand::ChatMessage(payload) => self.handle_chat_message(&conn, payload).await,
            ClientCommand::AdminMessageSubscriber(payload) => {
                self.handle_admin_direct(&conn, payload).await
            }
            ClientCommand::AdminBroadcast(payload) => {
                self.handle_admin_broadcast(&conn, payload).await
            }
            ClientCommand::MarkRead(payload) => self.handle_mark_read(&conn, payload).await,
            ClientCommand::GetConversations => self.handle_get_conversations(&conn).await,
            ClientCommand::GetMessages(payload) => self.handle_get_messages(&conn, payload).await,
            ClientCommand::Typing(payload) => self.handle_typing(&conn, payload).await,
        };

        if let Err(err) = result {
            tracing::debug!(conn_id = %connection_id, %err, "command failed");
            self.delivery.to_connection(connection_id, err.event());
        }
    }

    // -----------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------

    /// Support message from a widget user: append to the sender's support
    /// conversation and fan out. Two distinct events go to admins: the
    /// message itself and a sound cue.
    async fn handle_chat_message(
        &self,
        conn: &ConnectionInfo,
        payload: ChatMessagePayload,
    ) -> Result<(), ChatError> {
        let conversation_id = match payload.conversation_id {
            Some(id) => id,
            None => {
                let email = conn.email.clone().unwrap_or_else(|| "anonymous".to_string());
                self.store
                    .get_or_create(&conn.user_id, &email, ConversationKind::Support)
                    .await?
            }
        };

        let mut message = ChatMessage::text(
            conversation_id.clone(),
            conn.user_id.clone(),
            conn.role,
            conn.email.clone(),
            payload.message,
        );
        message.metadata = MessageMetadata {
            ip_address: payload.ip_address,
            user_agent: payload.user_agent,
            platform: payload.platform,
            ..MessageMetadata::default()
        };

        self.store.append(&conversation_id, message.clone()).await?;

        self.delivery
            .to_conversation_participants(
                &conversation_id,
                ServerEvent::new(EventName::NEW_MESSAGE, serde_json::to_value(&message)?),
            )
            .await;

        if conn.role != Role::Admin {
            self.delivery.to_all_admins(ServerEvent::new(
                EventName::SOUND_NOTIFICATION,
                serde_json::json!({
                    "sound": "message_received",
                    "message": "New support message received",
                    "conversationId": conversation_id,
                    "senderEmail": conn.email,
                }),
            ));
        }

        Ok(())
    }

    /// Admin → subscriber direct message. The target must be a known
    /// subscriber; whether they are live only affects the `delivered`
    /// flag in the confirmation, never success.
    async fn handle_admin_direct(
        &self,
        conn: &ConnectionInfo,
        payload: AdminDirectPayload,
    ) -> Result<(), ChatError> {
        if conn.role != Role::Admin {
            return Err(ChatError::AdminRequired);
        }

        if !self
            .directory
            .is_known_subscriber(&payload.subscriber_email)
            .await
        {
            return Err(ChatError::not_found("Subscriber not found"));
        }

        let conversation_id = self
            .store
            .get_or_create(
                &payload.subscriber_email,
                &payload.subscriber_email,
                ConversationKind::DirectMessage,
            )
            .await?;

        let mut message = ChatMessage::text(
            conversation_id.clone(),
            conn.user_id.clone(),
            Role::Admin,
            conn.email.clone(),
            payload.message,
        );
        message.recipient_email = Some(payload.subscriber_email.clone());

        self.store.append(&conversation_id, message.clone()).await?;

        let live = self.registry.find_by_email(&payload.subscriber_email);
        if let Some(target_id) = &live {
            self.delivery.to_connection(
                target_id,
                ServerEvent::new(EventName::ADMIN_MESSAGE, serde_json::to_value(&message)?),
            );
            self.delivery.to_connection(
                target_id,
                ServerEvent::sound("admin_message", "Message from admin", &conversation_id),
            );
        }

        self.delivery.to_connection(
            &conn.id,
            ServerEvent::new(
                EventName::MESSAGE_SENT,
                serde_json::json!({
                    "conversationId": conversation_id,
                    "recipientEmail": payload.subscriber_email,
                    "messageId": message.id,
                    "delivered": live.is_some(),
                }),
            ),
        );

        Ok(())
    }

    /// Admin broadcast: one broadcast-kind conversation per recipient,
    /// every message tagged with a shared broadcast id, best-effort live
    /// delivery counted per recipient.
    async fn handle_admin_broadcast(
        &self,
        conn: &ConnectionInfo,
        payload: AdminBroadcastPayload,
    ) -> Result<(), ChatError> {
        if conn.role != Role::Admin {
            return Err(ChatError::AdminRequired);
        }

        let target_emails = self.resolve_broadcast_targets(&payload).await?;

        let broadcast_id =
            scribe_common::id::prefixed_ulid(scribe_common::id::prefix::BROADCAST);

        // Append a message per recipient first, then fan out; appends
        // happen whether or not the recipient is live.
        let mut per_recipient: HashMap<String, (String, ChatMessage)> = HashMap::new();
        for email in &target_emails {
            let conversation_id = self
                .store
                .get_or_create(email, email, ConversationKind::Broadcast)
                .await?;

            let mut message = ChatMessage::text(
                conversation_id.clone(),
                conn.user_id.clone(),
                Role::Admin,
                conn.email.clone(),
                payload.message.clone(),
            );
            message.recipient_email = Some(email.clone());
            message.metadata.broadcast_id = Some(broadcast_id.clone());
            message.metadata.broadcast_filter = Some(payload.recipients.clone());

            self.store.append(&conversation_id, message.clone()).await?;
            per_recipient.insert(email.clone(), (conversation_id, message));
        }

        let outcome = self.delivery.broadcast(&target_emails, |email| {
            let Some((conversation_id, message)) = per_recipient.get(email) else {
                return Vec::new();
            };
            let message_json = match serde_json::to_value(message) {
                Ok(value) => value,
                Err(_) => return Vec::new(),
            };
            vec![
                ServerEvent::new(EventName::BROADCAST_MESSAGE, message_json),
                ServerEvent::sound(
                    "broadcast_message",
                    "Broadcast message from admin",
                    conversation_id,
                ),
            ]
        });

        self.delivery.to_connection(
            &conn.id,
            ServerEvent::new(
                EventName::BROADCAST_SENT,
                serde_json::json!({
                    "messageId": broadcast_id,
                    "totalRecipients": outcome.requested,
                    "deliveredCount": outcome.delivered,
                    "recipients": payload.recipients,
                }),
            ),
        );

        tracing::info!(
            %broadcast_id,
            filter = %payload.recipients,
            delivered = outcome.delivered,
            requested = outcome.requested,
            "admin broadcast sent"
        );

        Ok(())
    }

    /// Resolve the target email set for a broadcast. Rejection happens
    /// here, before any conversation is created or message appended.
    async fn resolve_broadcast_targets(
        &self,
        payload: &AdminBroadcastPayload,
    ) -> Result<Vec<String>, ChatError> {
        let filter = match payload.recipients.as_str() {
            "all" => RecipientFilter::All,
            "verified" => RecipientFilter::Verified,
            "subscribed" => RecipientFilter::Subscribed,
            "specific" => {
                let emails = payload.specific_emails.clone().unwrap_or_default();
                if emails.is_empty() {
                    return Err(ChatError::validation("Broadcast recipient list is empty"));
                }
                if let Some(bad) = emails.iter().find(|e| !is_valid_email(e)) {
                    return Err(ChatError::validation(format!(
                        "Invalid email address: {bad}"
                    )));
                }
                return Ok(emails);
            }
            other => {
                return Err(ChatError::validation(format!(
                    "Unknown recipients filter: {other}"
                )));
            }
        };
        Ok(self.directory.list_emails(filter).await)
    }

    async fn handle_mark_read(
        &self,
        conn: &ConnectionInfo,
        payload: MarkReadPayload,
    ) -> Result<(), ChatError> {
        let marked = self.store.mark_read(&payload.conversation_id).await?;

        self.delivery.to_connection(
            &conn.id,
            ServerEvent::new(
                EventName::MESSAGES_MARKED_READ,
                serde_json::json!({
                    "conversationId": payload.conversation_id,
                    "markedCount": marked,
                }),
            ),
        );
        Ok(())
    }

    async fn handle_get_conversations(&self, conn: &ConnectionInfo) -> Result<(), ChatError> {
        let conversations = self
            .store
            .list_for_participant(conn.email.as_deref(), conn.is_admin())
            .await?;

        self.delivery.to_connection(
            &conn.id,
            ServerEvent::new(
                EventName::CONVERSATIONS_LIST,
                serde_json::to_value(&conversations)?,
            ),
        );
        Ok(())
    }

    async fn handle_get_messages(
        &self,
        conn: &ConnectionInfo,
        payload: GetMessagesPayload,
    ) -> Result<(), ChatError> {
        let messages = self.store.messages_of(&payload.conversation_id).await?;

        self.delivery.to_connection(
            &conn.id,
            ServerEvent::new(
                EventName::CONVERSATION_MESSAGES,
                serde_json::json!({
                    "conversationId": payload.conversation_id,
                    "messages": messages,
                }),
            ),
        );
        Ok(())
    }

    /// Purely ephemeral: no persistence, no state machine.
    async fn handle_typing(
        &self,
        conn: &ConnectionInfo,
        payload: TypingPayload,
    ) -> Result<(), ChatError> {
        self.delivery
            .to_conversation_participants(
                &payload.conversation_id,
                ServerEvent::new(
                    EventName::TYPING_INDICATOR,
                    serde_json::json!({
                        "userId": conn.user_id,
                        "userType": conn.role,
                        "email": conn.email,
                        "isTyping": payload.is_typing,
                        "conversationId": payload.conversation_id,
                    }),
                ),
            )
            .await;
        Ok(())
    }
}
