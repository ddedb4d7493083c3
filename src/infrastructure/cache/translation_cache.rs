//! Translation Cache
//!
//! Redis-backed cache for on-demand room message translations, keyed by
//! (message id, target language) so each pair is translated at most once
//! while the entry lives.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::keys;
use crate::domain::TranslationCache;
use crate::shared::error::AppError;

/// Redis translation cache service
#[derive(Clone)]
pub struct RedisTranslationCache {
    redis: ConnectionManager,
    ttl: u64,
}

impl RedisTranslationCache {
    /// Create a new translation cache with the given entry TTL in seconds.
    pub fn new(redis: ConnectionManager, ttl: u64) -> Self {
        Self { redis, ttl }
    }
}

#[async_trait]
impl TranslationCache for RedisTranslationCache {
    async fn get(&self, message_id: i64, target_lang: &str) -> Result<Option<String>, AppError> {
        let key = keys::translation(message_id, target_lang);

        let mut conn = self.redis.clone();
        let cached: Option<String> = conn.get(&key).await?;

        Ok(cached)
    }

    async fn put(
        &self,
        message_id: i64,
        target_lang: &str,
        translated: &str,
    ) -> Result<(), AppError> {
        let key = keys::translation(message_id, target_lang);

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(&key, translated, self.ttl).await?;

        Ok(())
    }
}
