//! Application Startup
//!
//! Application building and server initialization: every service is
//! constructed here and injected where it is needed; nothing reaches for a
//! global.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;

use crate::application::{DeliveryService, OfflinePushService, RetentionSweeper};
use crate::config::Settings;
use crate::domain::ParticipantRepository;
use crate::infrastructure::cache::{self, RedisTranslationCache};
use crate::infrastructure::database;
use crate::infrastructure::push::HttpPushGateway;
use crate::infrastructure::repositories::{
    PgIdentityRepository, PgMessageRepository, PgParticipantRepository, PgPushTargetRepository,
    PgRetentionPolicyRepository,
};
use crate::infrastructure::translation::HttpTranslationClient;
use crate::presentation::http::routes;
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::{Gateway, SessionAuthenticator};
use crate::shared::snowflake::SnowflakeGenerator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub authenticator: Arc<SessionAuthenticator>,
    pub delivery: Arc<DeliveryService>,
    pub push: Arc<OfflinePushService>,
    pub participants: Arc<dyn ParticipantRepository>,
    pub settings: Arc<Settings>,
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    sweeper: Arc<RetentionSweeper>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        // Create database pool and apply migrations
        let db = database::create_pool(&settings.database).await?;
        database::run_migrations(&db).await?;
        tracing::info!("Database connection pool created");

        // Create Redis connection
        let redis = cache::create_redis_client(&settings.redis).await?;
        tracing::info!("Redis connection established");

        // Repositories
        let messages = Arc::new(PgMessageRepository::new(db.clone()));
        let participants: Arc<dyn ParticipantRepository> =
            Arc::new(PgParticipantRepository::new(db.clone()));
        let retention = Arc::new(PgRetentionPolicyRepository::new(db.clone()));
        let push_targets = Arc::new(PgPushTargetRepository::new(db.clone()));
        let identities = Arc::new(PgIdentityRepository::new(db.clone()));

        // Outbound collaborators
        let translator = Arc::new(HttpTranslationClient::new(&settings.translation)?);
        let translation_cache = Arc::new(RedisTranslationCache::new(
            redis.clone(),
            settings.redis.translation_ttl,
        ));
        let push_gateway = Arc::new(HttpPushGateway::new(&settings.push)?);

        // Core services
        let snowflake = Arc::new(SnowflakeGenerator::new(
            settings.snowflake.machine_id as u64,
            0u64,
        ));
        let gateway = Arc::new(Gateway::new());
        let authenticator = Arc::new(SessionAuthenticator::new(
            &settings.jwt.secret,
            identities,
        ));
        let delivery = Arc::new(DeliveryService::new(
            messages.clone(),
            participants.clone(),
            retention,
            translator,
            translation_cache,
            snowflake,
            settings.websocket.max_content_length,
        ));
        let push = Arc::new(OfflinePushService::new(
            push_targets,
            push_gateway,
            settings.push.preview_length,
        ));

        // Sweeper broadcasts deletions through the gateway
        let sweeper = Arc::new(RetentionSweeper::new(
            messages,
            gateway.clone(),
            Duration::from_secs(settings.retention.sweep_interval_secs),
        ));

        let state = AppState {
            gateway,
            authenticator,
            delivery,
            push,
            participants,
            settings: Arc::new(settings.clone()),
        };

        // Build router with middleware
        let router = routes::create_router(state)
            .layer(logging::create_trace_layer())
            .layer(cors::create_cors_layer(&settings.cors));

        // Bind to address
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            sweeper,
        })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        self.sweeper.spawn();
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
