//! Push Target Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{PushTarget, PushTargetRepository};
use crate::shared::error::AppError;

/// PostgreSQL push target repository implementation.
pub struct PgPushTargetRepository {
    pool: PgPool,
}

impl PgPushTargetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PushTargetRow {
    id: i64,
    user_id: i64,
    address: String,
    platform: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl PushTargetRow {
    fn into_target(self) -> PushTarget {
        PushTarget {
            id: self.id,
            user_id: self.user_id,
            address: self.address,
            platform: self.platform,
            active: self.active,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl PushTargetRepository for PgPushTargetRepository {
    async fn find_active_for_users(&self, user_ids: &[i64]) -> Result<Vec<PushTarget>, AppError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PushTargetRow>(
            r#"
            SELECT id, user_id, address, platform, active, created_at
            FROM push_targets
            WHERE user_id = ANY($1) AND active
            ORDER BY id
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_target()).collect())
    }

    async fn register(
        &self,
        user_id: i64,
        address: &str,
        platform: &str,
    ) -> Result<PushTarget, AppError> {
        // Re-registering an address reactivates it.
        let row = sqlx::query_as::<_, PushTargetRow>(
            r#"
            INSERT INTO push_targets (user_id, address, platform)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, address)
                DO UPDATE SET active = TRUE, platform = EXCLUDED.platform
            RETURNING id, user_id, address, platform, active, created_at
            "#,
        )
        .bind(user_id)
        .bind(address)
        .bind(platform)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_target())
    }

    async fn deactivate(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE push_targets SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
