//! Persisted channel participation and identity resolution.
//!
//! The participant table is the authorization source: it decides who may join
//! a channel and who the offline fallback fans out to. It is distinct from
//! the in-memory membership registry, which only reflects currently connected
//! sessions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::channel::ChannelRef;
use crate::shared::error::AppError;

/// One authorized member of a channel.
///
/// Maps to the `channel_participants` table:
/// - channel_kind: VARCHAR(16) NOT NULL
/// - channel_id: BIGINT NOT NULL
/// - user_id: BIGINT NOT NULL
/// - language: VARCHAR(16) NOT NULL DEFAULT 'en'
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: i64,
    /// The participant's preferred reading language
    pub language: String,
}

/// Repository trait for persisted channel membership.
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    /// All authorized participants of a channel, with their languages.
    async fn participants(&self, channel: ChannelRef) -> Result<Vec<Participant>, AppError>;

    /// Whether a user is authorized to participate in a channel.
    async fn is_participant(&self, channel: ChannelRef, user_id: i64) -> Result<bool, AppError>;
}

/// Resolves opaque external identifiers from credentials to user ids.
///
/// Used by the session authenticator when the credential carries no numeric
/// subject; resolution failure rejects the connection.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<i64>, AppError>;
}
