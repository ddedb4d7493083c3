//! Message entity and repository trait.
//!
//! Maps to the `messages` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::channel::ChannelRef;
use super::retention::RetentionPolicy;
use crate::shared::error::AppError;

/// Represents a persisted chat message.
///
/// Maps to the `messages` table:
/// - id: BIGINT PRIMARY KEY (Snowflake ID, monotonic)
/// - channel_kind: VARCHAR(16) NOT NULL ('conversation' | 'room')
/// - channel_id: BIGINT NOT NULL
/// - sender_id: BIGINT NOT NULL
/// - content: TEXT NOT NULL
/// - source_lang: VARCHAR(16) NOT NULL
/// - translated_content: TEXT NULL   -- eager translation, conversations only
/// - target_lang: VARCHAR(16) NULL
/// - idempotency_key: VARCHAR(64) NULL, unique per channel_kind when present
/// - retention_secs: BIGINT NULL     -- policy snapshot frozen at send time
/// - expires_at: TIMESTAMPTZ NULL
/// - deleted_at: TIMESTAMPTZ NULL    -- soft-delete marker
/// - created_at: TIMESTAMPTZ NOT NULL
///
/// Rows are mutated only to set a translation, set the expiry on read, or
/// soft-delete; they are never physically removed outside operator purges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Broadcast scope the message was sent to
    pub channel: ChannelRef,

    /// Sender user ID
    pub sender_id: i64,

    /// Original message content
    pub content: String,

    /// Language tag of the original content
    pub source_lang: String,

    /// Eagerly translated content (direct conversations only)
    pub translated_content: Option<String>,

    /// Language tag of the eager translation
    pub target_lang: Option<String>,

    /// Client-supplied dedup token, reused across retries of one logical send
    pub idempotency_key: Option<String>,

    /// Retention policy snapshot frozen at send time
    pub retention: RetentionPolicy,

    /// When the content becomes inaccessible (NULL for never / unread on-read)
    pub expires_at: Option<DateTime<Utc>>,

    /// Soft-delete marker set by the retention sweeper or explicit deletion
    pub deleted_at: Option<DateTime<Utc>>,

    /// Timestamp when message was sent
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Check if this message has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Check if this message is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }

    /// The text a reader in `lang` should see when a translation is attached.
    pub fn text_for(&self, lang: &str) -> &str {
        match (&self.translated_content, &self.target_lang) {
            (Some(translated), Some(target)) if target == lang => translated,
            _ => &self.content,
        }
    }
}

/// Repository trait for Message data access operations.
///
/// Only the delivery engine creates and translates messages, and only the
/// retention sweeper soft-deletes them; no other component writes this table.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Find a message by its Snowflake ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError>;

    /// Find the message holding `key` within the given channel kind.
    async fn find_by_idempotency_key(
        &self,
        channel: ChannelRef,
        key: &str,
    ) -> Result<Option<Message>, AppError>;

    /// Insert a message, deferring duplicate-key races to the storage layer.
    ///
    /// When the message carries an idempotency key and another row already
    /// holds it, no new row is created and the existing row is returned
    /// instead. Callers cannot distinguish winning from losing the race other
    /// than by comparing ids, which is exactly the dedup contract.
    async fn create_idempotent(&self, message: &Message) -> Result<Message, AppError>;

    /// Attach an eager translation to an existing message.
    async fn set_translation(
        &self,
        id: i64,
        translated: &str,
        target_lang: &str,
    ) -> Result<(), AppError>;

    /// Freeze the expiry of an unread on-read message to the read timestamp.
    ///
    /// Only applies when the stored policy is on-read and no expiry has been
    /// set yet; otherwise this is a no-op. Returns whether a row was updated.
    async fn set_expiry_on_read(
        &self,
        id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Messages whose expiry is at or before `now` and not yet soft-deleted.
    async fn find_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<Message>, AppError>;

    /// Soft-delete the given messages: keep the rows, redact the content.
    /// Already-deleted rows are skipped. Returns the ids actually marked, so
    /// callers broadcasting deletions never announce a row twice.
    async fn mark_deleted(
        &self,
        ids: &[i64],
        deleted_at: DateTime<Utc>,
    ) -> Result<Vec<i64>, AppError>;
}
