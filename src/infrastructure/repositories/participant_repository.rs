//! Participant and Identity Repository Implementations
//!
//! Persisted channel membership (the authorization source) and external
//! identity resolution for the session authenticator.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{
    ChannelRef, IdentityRepository, Participant, ParticipantRepository,
};
use crate::shared::error::AppError;

/// PostgreSQL participant repository implementation.
pub struct PgParticipantRepository {
    pool: PgPool,
}

impl PgParticipantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ParticipantRow {
    user_id: i64,
    language: String,
}

#[async_trait]
impl ParticipantRepository for PgParticipantRepository {
    async fn participants(&self, channel: ChannelRef) -> Result<Vec<Participant>, AppError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT user_id, language
            FROM channel_participants
            WHERE channel_kind = $1 AND channel_id = $2
            ORDER BY user_id
            "#,
        )
        .bind(channel.kind.as_str())
        .bind(channel.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Participant {
                user_id: r.user_id,
                language: r.language,
            })
            .collect())
    }

    async fn is_participant(&self, channel: ChannelRef, user_id: i64) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM channel_participants
                WHERE channel_kind = $1 AND channel_id = $2 AND user_id = $3
            )
            "#,
        )
        .bind(channel.kind.as_str())
        .bind(channel.id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

/// PostgreSQL external identity resolver.
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<i64>, AppError> {
        let user_id = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM external_identities WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }
}
