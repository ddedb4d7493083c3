//! WebSocket Event Types
//!
//! The wire protocol is a closed set of tagged variants in both directions,
//! dispatched through exhaustive matches. Adding an event is a compile-time
//! change, not a runtime string registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelRef, Message};

/// Events consumed from clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Explicit auth frame, for clients that cannot set a query parameter
    Auth { token: String },

    /// Join a channel's broadcast group
    Join { channel: ChannelRef },

    /// Leave a channel's broadcast group
    Leave { channel: ChannelRef },

    /// Send a message
    Send {
        channel: ChannelRef,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_lang: Option<String>,
        /// Reused verbatim across retries of one logical send
        #[serde(skip_serializing_if = "Option::is_none")]
        idempotency_key: Option<String>,
    },

    /// Ephemeral typing indicator on
    TypingStart { channel: ChannelRef },

    /// Ephemeral typing indicator off
    TypingStop { channel: ChannelRef },

    /// Read receipt for a message
    MarkRead {
        channel: ChannelRef,
        message_id: i64,
    },

    /// Explicit deletion-broadcast relay
    Delete {
        channel: ChannelRef,
        message_id: i64,
    },
}

/// Events emitted to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Session established; the connection is authenticated
    Ready { user_id: i64, session_id: String },

    /// A new message in a joined channel
    MessageNew { message: MessagePayload },

    /// Acknowledgment of a send; echoes the idempotency key so the client
    /// correlates it to the exact logical attempt awaiting release
    SendAck {
        message_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        idempotency_key: Option<String>,
    },

    TypingStart { channel: ChannelRef, user_id: i64 },

    TypingStop { channel: ChannelRef, user_id: i64 },

    /// A member's session joined the channel
    MemberJoined { channel: ChannelRef, user_id: i64 },

    /// A member's session left the channel (explicit leave or disconnect)
    MemberLeft { channel: ChannelRef, user_id: i64 },

    /// A message was soft-deleted (explicit delete or retention sweep)
    MessageDeleted {
        channel: ChannelRef,
        message_id: i64,
    },

    /// Terminal error for the triggering request or connection attempt
    Error {
        code: String,
        reason: String,
        /// Whether re-trying with a refreshed credential can help
        retryable: bool,
    },
}

/// The message payload carried by `message_new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: i64,
    pub channel: ChannelRef,
    pub sender_id: i64,
    pub content: String,
    pub source_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_lang: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            channel: message.channel,
            sender_id: message.sender_id,
            content: message.content.clone(),
            source_lang: message.source_lang.clone(),
            translated_content: message.translated_content.clone(),
            target_lang: message.target_lang.clone(),
            created_at: message.created_at,
        }
    }
}
