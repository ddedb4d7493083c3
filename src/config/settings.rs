//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Redis configuration (translation cache)
    pub redis: RedisSettings,

    /// Credential verification settings
    pub jwt: JwtSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// WebSocket configuration
    pub websocket: WebSocketSettings,

    /// Retention sweeper configuration
    pub retention: RetentionSettings,

    /// Translation service collaborator
    pub translation: TranslationSettings,

    /// Push notification gateway collaborator
    pub push: PushSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins; empty means allow any (development)
    pub allowed_origins: Vec<String>,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,

    /// TTL for cached translations in seconds
    pub translation_ttl: u64,
}

/// Signed credential verification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for verifying credential signatures
    pub secret: String,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-31)
    pub machine_id: u16,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Connection timeout for the auth frame in seconds (default: 30)
    pub auth_timeout_secs: u64,

    /// Maximum message content length in characters
    pub max_content_length: usize,
}

/// Retention sweeper configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionSettings {
    /// Interval between sweep ticks in seconds (default: 60)
    pub sweep_interval_secs: u64,
}

/// Translation service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationSettings {
    /// Base URL of the translation HTTP API
    pub base_url: String,

    /// API key sent with every request
    pub api_key: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Push notification gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushSettings {
    /// Base URL of the push gateway HTTP API
    pub base_url: String,

    /// Server key sent with every dispatch
    pub server_key: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum characters of message content in a push preview
    pub preview_length: usize,
}

/// Minimum required length for the credential secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if the credential secret is too short.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("redis.translation_ttl", 86400_i64)?
            .set_default("snowflake.machine_id", 1)?
            .set_default("websocket.auth_timeout_secs", 30_i64)?
            .set_default("websocket.max_content_length", 4000_i64)?
            .set_default("retention.sweep_interval_secs", 60_i64)?
            .set_default("translation.timeout_secs", 5_i64)?
            .set_default("push.timeout_secs", 5_i64)?
            .set_default("push.preview_length", 120_i64)?
            .set_default("cors.allowed_origins", Vec::<String>::new())?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "translation.base_url",
                std::env::var("TRANSLATION_BASE_URL").ok(),
            )?
            .set_override_option(
                "translation.api_key",
                std::env::var("TRANSLATION_API_KEY").ok(),
            )?
            .set_override_option("push.base_url", std::env::var("PUSH_BASE_URL").ok())?
            .set_override_option("push.server_key", std::env::var("PUSH_SERVER_KEY").ok())?
            .set_override_option(
                "snowflake.machine_id",
                std::env::var("SNOWFLAKE_MACHINE_ID").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                // Validate credential secret length for security
                if settings.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
                    return Err(ConfigError::Message(format!(
                        "JWT secret must be at least {} characters for security. Current length: {}",
                        MIN_JWT_SECRET_LENGTH,
                        settings.jwt.secret.len()
                    )));
                }
                Ok(settings)
            })
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerSettings {
    /// Get the socket address for binding.
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid server address configuration")
    }
}
