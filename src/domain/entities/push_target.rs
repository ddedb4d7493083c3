//! Push target entity and repository trait.
//!
//! Maps to the `push_targets` table. A push target is one registered device
//! address for a user; a user may hold several.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// A registered push notification address for a user.
///
/// Maps to the `push_targets` table:
/// - id: BIGSERIAL PRIMARY KEY
/// - user_id: BIGINT NOT NULL
/// - address: TEXT NOT NULL (opaque gateway token)
/// - platform: VARCHAR(16) NOT NULL
/// - active: BOOLEAN NOT NULL DEFAULT TRUE
/// - created_at: TIMESTAMPTZ NOT NULL
///
/// Targets the gateway reports permanently invalid are marked inactive, never
/// deleted, so registration history survives for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTarget {
    pub id: i64,
    pub user_id: i64,
    /// Opaque push address understood only by the gateway
    pub address: String,
    /// Platform tag ("ios", "android", "web")
    pub platform: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Repository trait for push target data access.
#[async_trait]
pub trait PushTargetRepository: Send + Sync {
    /// All active targets registered for any of the given users.
    async fn find_active_for_users(&self, user_ids: &[i64]) -> Result<Vec<PushTarget>, AppError>;

    /// Register a target for a user (idempotent per (user, address)).
    async fn register(
        &self,
        user_id: i64,
        address: &str,
        platform: &str,
    ) -> Result<PushTarget, AppError>;

    /// Mark a target inactive after a permanent delivery failure.
    async fn deactivate(&self, id: i64) -> Result<(), AppError>;
}
