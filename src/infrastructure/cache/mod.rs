//! Cache Module
//!
//! Redis connection management and the translate-on-demand cache.

mod translation_cache;

pub use translation_cache::RedisTranslationCache;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RedisSettings;

/// Creates a Redis connection manager with automatic reconnection.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Cache key prefixes.
pub mod keys {
    /// Prefix for cached room message translations
    /// (e.g., "translation:message_id:lang")
    pub const TRANSLATION: &str = "translation:";

    /// Generates a translation cache key for a (message, language) pair
    #[inline]
    pub fn translation(message_id: i64, lang: &str) -> String {
        format!("{}{}:{}", TRANSLATION, message_id, lang)
    }
}
