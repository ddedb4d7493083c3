//! Message Repository Implementation
//!
//! PostgreSQL implementation of message persistence. Duplicate sends are
//! resolved at the storage layer by a partial unique index on
//! (channel_kind, idempotency_key): the insert uses ON CONFLICT DO NOTHING
//! and the loser of a retry race reads back the winner's row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{ChannelKind, ChannelRef, Message, MessageRepository, RetentionPolicy};
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MESSAGE_COLUMNS: &str = r#"
    id, channel_kind, channel_id, sender_id, content, source_lang,
    translated_content, target_lang, idempotency_key, retention_secs,
    expires_at, deleted_at, created_at
"#;

/// Internal row type for message queries.
/// Maps to the messages table schema defined in the migration.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    channel_kind: String,
    channel_id: i64,
    sender_id: i64,
    content: String,
    source_lang: String,
    translated_content: Option<String>,
    target_lang: Option<String>,
    idempotency_key: Option<String>,
    retention_secs: Option<i64>,
    expires_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    /// Converts database row to domain Message entity.
    fn into_message(self) -> Result<Message, AppError> {
        let kind = ChannelKind::from_str(&self.channel_kind).ok_or_else(|| {
            AppError::Internal(format!("Unknown channel kind: {}", self.channel_kind))
        })?;

        Ok(Message {
            id: self.id,
            channel: ChannelRef {
                kind,
                id: self.channel_id,
            },
            sender_id: self.sender_id,
            content: self.content,
            source_lang: self.source_lang,
            translated_content: self.translated_content,
            target_lang: self.target_lang,
            idempotency_key: self.idempotency_key,
            retention: RetentionPolicy::from_db(self.retention_secs),
            expires_at: self.expires_at,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_message()).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        channel: ChannelRef,
        key: &str,
    ) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE channel_kind = $1 AND idempotency_key = $2
            "#
        ))
        .bind(channel.kind.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_message()).transpose()
    }

    async fn create_idempotent(&self, message: &Message) -> Result<Message, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO messages (
                id, channel_kind, channel_id, sender_id, content, source_lang,
                translated_content, target_lang, idempotency_key,
                retention_secs, expires_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (channel_kind, idempotency_key)
                WHERE idempotency_key IS NOT NULL
                DO NOTHING
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.id)
        .bind(message.channel.kind.as_str())
        .bind(message.channel.id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(&message.source_lang)
        .bind(&message.translated_content)
        .bind(&message.target_lang)
        .bind(&message.idempotency_key)
        .bind(message.retention.to_db())
        .bind(message.expires_at)
        .bind(message.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return row.into_message();
        }

        // Lost the race: another retry of the same logical send already
        // inserted the row. Read the winner back.
        let key = message.idempotency_key.as_deref().ok_or_else(|| {
            AppError::Internal("Insert without idempotency key returned no row".into())
        })?;

        self.find_by_idempotency_key(message.channel, key)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("Winning row for idempotency key {key} vanished"))
            })
    }

    async fn set_translation(
        &self,
        id: i64,
        translated: &str,
        target_lang: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE messages
            SET translated_content = $2, target_lang = $3
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(translated)
        .bind(target_lang)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_expiry_on_read(
        &self,
        id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // Guarded on retention_secs = 0 (on-read) and an unset expiry so the
        // first read wins and fixed-duration policies are never shortened.
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET expires_at = $2
            WHERE id = $1
              AND retention_secs = 0
              AND expires_at IS NULL
              AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(read_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE expires_at IS NOT NULL
              AND expires_at <= $1
              AND deleted_at IS NULL
            ORDER BY id
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_message()).collect()
    }

    async fn mark_deleted(
        &self,
        ids: &[i64],
        deleted_at: DateTime<Utc>,
    ) -> Result<Vec<i64>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Keep the row for audit; the content is redacted so readers can
        // never recover it. RETURNING reports which rows this call actually
        // marked, excluding anything a concurrent writer got to first.
        let marked = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE messages
            SET deleted_at = $2, content = '', translated_content = NULL
            WHERE id = ANY($1) AND deleted_at IS NULL
            RETURNING id
            "#,
        )
        .bind(ids)
        .bind(deleted_at)
        .fetch_all(&self.pool)
        .await?;

        Ok(marked)
    }
}
