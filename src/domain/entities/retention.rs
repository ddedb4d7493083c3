//! Message retention policy.
//!
//! A policy is resolved once per send, from the more specific of the room
//! override and the sender's personal default, and frozen onto the message
//! row. Later policy changes never apply retroactively.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// When a message's content becomes inaccessible.
///
/// Database encoding (`retention_secs` column): `NULL` = never,
/// `0` = on-read, `N` = fixed duration in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Message never expires
    #[default]
    Never,
    /// Message expires once the other party has read it
    OnRead,
    /// Message expires a fixed number of seconds after send
    After(i64),
}

impl RetentionPolicy {
    /// Decode from the database column value.
    pub fn from_db(secs: Option<i64>) -> Self {
        match secs {
            None => Self::Never,
            Some(0) => Self::OnRead,
            Some(n) => Self::After(n),
        }
    }

    /// Encode to the database column value.
    pub fn to_db(&self) -> Option<i64> {
        match self {
            Self::Never => None,
            Self::OnRead => Some(0),
            Self::After(n) => Some(*n),
        }
    }

    /// Pick the applicable policy for a send: the room override, when one
    /// exists, wins over the sender's personal default.
    pub fn resolve(room_override: Option<RetentionPolicy>, sender_default: RetentionPolicy) -> Self {
        room_override.unwrap_or(sender_default)
    }

    /// Expiry timestamp frozen onto the message at send time.
    ///
    /// On-read policies must NOT compute an expiry here: no read has happened
    /// yet. Their expiry is set to the read timestamp when the read receipt
    /// arrives, and stays NULL until then.
    pub fn expiry_at_send(&self, sent_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Never | Self::OnRead => None,
            Self::After(secs) => Some(sent_at + Duration::seconds(*secs)),
        }
    }

    pub fn is_on_read(&self) -> bool {
        matches!(self, Self::OnRead)
    }
}

/// Persisted retention configuration: per-user default and per-room override.
#[async_trait]
pub trait RetentionPolicyRepository: Send + Sync {
    /// The sender's personal default policy (`Never` when unset).
    async fn user_default(&self, user_id: i64) -> Result<RetentionPolicy, AppError>;

    /// The room's override policy, or `None` when the room has no override.
    async fn room_override(&self, room_id: i64) -> Result<Option<RetentionPolicy>, AppError>;
}
