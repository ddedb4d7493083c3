//! Retention Policy Repository Implementation
//!
//! Reads the persisted retention configuration surface: per-user defaults and
//! per-room overrides. Row presence in `room_retention_overrides` is what
//! makes an override "present"; the column value then encodes the policy
//! (NULL = never, 0 = on-read, N = seconds).

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{RetentionPolicy, RetentionPolicyRepository};
use crate::shared::error::AppError;

/// PostgreSQL retention policy repository implementation.
pub struct PgRetentionPolicyRepository {
    pool: PgPool,
}

impl PgRetentionPolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RetentionPolicyRepository for PgRetentionPolicyRepository {
    async fn user_default(&self, user_id: i64) -> Result<RetentionPolicy, AppError> {
        let row = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT retention_secs FROM user_retention_defaults WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        // No row at all means the user never configured a policy.
        Ok(match row {
            Some(secs) => RetentionPolicy::from_db(secs),
            None => RetentionPolicy::Never,
        })
    }

    async fn room_override(&self, room_id: i64) -> Result<Option<RetentionPolicy>, AppError> {
        let row = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT retention_secs FROM room_retention_overrides WHERE room_id = $1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RetentionPolicy::from_db))
    }
}
