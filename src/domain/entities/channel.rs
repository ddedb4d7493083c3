//! Channel reference value objects.
//!
//! A channel is a logical broadcast scope, not a stored entity: it groups the
//! live sessions a message fans out to. Two kinds exist, two-party direct
//! conversations and multi-party rooms.

use serde::{Deserialize, Serialize};

/// The kind of broadcast scope a message belongs to.
///
/// Stored as a string column (`channel_kind`) on messages and participants.
/// Idempotency keys are unique per kind, so the kinds partition the key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Two-party direct conversation
    Conversation,
    /// Multi-party group room
    Room,
}

impl ChannelKind {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "conversation" => Some(Self::Conversation),
            "room" => Some(Self::Room),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Room => "room",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully qualified channel reference: kind + numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub kind: ChannelKind,
    pub id: i64,
}

impl ChannelRef {
    pub fn conversation(id: i64) -> Self {
        Self {
            kind: ChannelKind::Conversation,
            id,
        }
    }

    pub fn room(id: i64) -> Self {
        Self {
            kind: ChannelKind::Room,
            id,
        }
    }

    pub fn is_conversation(&self) -> bool {
        self.kind == ChannelKind::Conversation
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
