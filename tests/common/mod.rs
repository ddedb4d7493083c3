//! Common Test Utilities
//!
//! In-memory fakes for the repository and collaborator traits, plus a
//! pre-wired delivery engine harness. The fakes honor the same contracts as
//! the Postgres/Redis/HTTP implementations, in particular the storage-level
//! idempotency uniqueness that the dedup path leans on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use chat_relay::application::{DeletionNotifier, DeliveryService};
use chat_relay::client::{Connection, Transport, TransportError};
use chat_relay::domain::{
    ChannelRef, IdentityRepository, Message, MessageRepository, Participant,
    ParticipantRepository, PushGateway, PushNotification, PushOutcome, PushTarget,
    PushTargetRepository, RetentionPolicy, RetentionPolicyRepository, TranslationCache,
    TranslationClient,
};
use chat_relay::presentation::websocket::{ClientEvent, ServerEvent};
use chat_relay::shared::error::AppError;
use chat_relay::shared::snowflake::SnowflakeGenerator;

/// In-memory message store enforcing per-kind idempotency key uniqueness.
#[derive(Default)]
pub struct InMemoryMessages {
    pub rows: Mutex<Vec<Message>>,
}

impl InMemoryMessages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn get(&self, id: i64) -> Option<Message> {
        self.rows.lock().iter().find(|m| m.id == id).cloned()
    }

    pub fn insert(&self, message: Message) {
        self.rows.lock().push(message);
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessages {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        Ok(self.get(id))
    }

    async fn find_by_idempotency_key(
        &self,
        channel: ChannelRef,
        key: &str,
    ) -> Result<Option<Message>, AppError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|m| {
                m.channel.kind == channel.kind && m.idempotency_key.as_deref() == Some(key)
            })
            .cloned())
    }

    async fn create_idempotent(&self, message: &Message) -> Result<Message, AppError> {
        let mut rows = self.rows.lock();
        if let Some(key) = &message.idempotency_key {
            if let Some(existing) = rows.iter().find(|m| {
                m.channel.kind == message.channel.kind
                    && m.idempotency_key.as_deref() == Some(key.as_str())
            }) {
                return Ok(existing.clone());
            }
        }
        rows.push(message.clone());
        Ok(message.clone())
    }

    async fn set_translation(
        &self,
        id: i64,
        translated: &str,
        target_lang: &str,
    ) -> Result<(), AppError> {
        let mut rows = self.rows.lock();
        if let Some(row) = rows.iter_mut().find(|m| m.id == id) {
            row.translated_content = Some(translated.to_string());
            row.target_lang = Some(target_lang.to_string());
        }
        Ok(())
    }

    async fn set_expiry_on_read(
        &self,
        id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut rows = self.rows.lock();
        if let Some(row) = rows.iter_mut().find(|m| {
            m.id == id
                && m.retention.is_on_read()
                && m.expires_at.is_none()
                && m.deleted_at.is_none()
        }) {
            row.expires_at = Some(read_at);
            return Ok(true);
        }
        Ok(false)
    }

    async fn find_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<Message>, AppError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|m| m.deleted_at.is_none() && m.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn mark_deleted(
        &self,
        ids: &[i64],
        deleted_at: DateTime<Utc>,
    ) -> Result<Vec<i64>, AppError> {
        let mut rows = self.rows.lock();
        let mut marked = Vec::new();
        for row in rows.iter_mut() {
            if ids.contains(&row.id) && row.deleted_at.is_none() {
                row.deleted_at = Some(deleted_at);
                row.content.clear();
                row.translated_content = None;
                marked.push(row.id);
            }
        }
        Ok(marked)
    }
}

/// Fixed channel membership.
#[derive(Default)]
pub struct StaticParticipants {
    channels: Mutex<HashMap<ChannelRef, Vec<Participant>>>,
}

impl StaticParticipants {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, channel: ChannelRef, members: &[(i64, &str)]) {
        self.channels.lock().insert(
            channel,
            members
                .iter()
                .map(|(user_id, language)| Participant {
                    user_id: *user_id,
                    language: language.to_string(),
                })
                .collect(),
        );
    }
}

#[async_trait]
impl ParticipantRepository for StaticParticipants {
    async fn participants(&self, channel: ChannelRef) -> Result<Vec<Participant>, AppError> {
        Ok(self.channels.lock().get(&channel).cloned().unwrap_or_default())
    }

    async fn is_participant(&self, channel: ChannelRef, user_id: i64) -> Result<bool, AppError> {
        Ok(self
            .channels
            .lock()
            .get(&channel)
            .map(|members| members.iter().any(|p| p.user_id == user_id))
            .unwrap_or(false))
    }
}

/// Fixed retention policies; absent users default to keep-forever.
#[derive(Default)]
pub struct StaticRetention {
    pub user_defaults: Mutex<HashMap<i64, RetentionPolicy>>,
    pub room_overrides: Mutex<HashMap<i64, RetentionPolicy>>,
}

impl StaticRetention {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RetentionPolicyRepository for StaticRetention {
    async fn user_default(&self, user_id: i64) -> Result<RetentionPolicy, AppError> {
        Ok(self
            .user_defaults
            .lock()
            .get(&user_id)
            .copied()
            .unwrap_or(RetentionPolicy::Never))
    }

    async fn room_override(&self, room_id: i64) -> Result<Option<RetentionPolicy>, AppError> {
        Ok(self.room_overrides.lock().get(&room_id).copied())
    }
}

/// Deterministic translator that tags text with the target language.
#[derive(Default)]
pub struct EchoTranslator {
    pub calls: AtomicUsize,
}

impl EchoTranslator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationClient for EchoTranslator {
    async fn translate(&self, text: &str, _source_lang: &str, target_lang: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        format!("[{target_lang}] {text}")
    }
}

/// In-memory translation cache.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<(i64, String), String>>,
}

impl InMemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TranslationCache for InMemoryCache {
    async fn get(&self, message_id: i64, target_lang: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .entries
            .lock()
            .get(&(message_id, target_lang.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        message_id: i64,
        target_lang: &str,
        translated: &str,
    ) -> Result<(), AppError> {
        self.entries
            .lock()
            .insert((message_id, target_lang.to_string()), translated.to_string());
        Ok(())
    }
}

/// In-memory push target registry.
#[derive(Default)]
pub struct InMemoryPushTargets {
    pub targets: Mutex<Vec<PushTarget>>,
    next_id: AtomicUsize,
}

impl InMemoryPushTargets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, user_id: i64, address: &str) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        self.targets.lock().push(PushTarget {
            id,
            user_id,
            address: address.to_string(),
            platform: "ios".to_string(),
            active: true,
            created_at: Utc::now(),
        });
        id
    }

    pub fn is_active(&self, id: i64) -> bool {
        self.targets
            .lock()
            .iter()
            .any(|t| t.id == id && t.active)
    }
}

#[async_trait]
impl PushTargetRepository for InMemoryPushTargets {
    async fn find_active_for_users(&self, user_ids: &[i64]) -> Result<Vec<PushTarget>, AppError> {
        Ok(self
            .targets
            .lock()
            .iter()
            .filter(|t| t.active && user_ids.contains(&t.user_id))
            .cloned()
            .collect())
    }

    async fn register(
        &self,
        user_id: i64,
        address: &str,
        _platform: &str,
    ) -> Result<PushTarget, AppError> {
        let id = self.add(user_id, address);
        Ok(self
            .targets
            .lock()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .expect("just registered"))
    }

    async fn deactivate(&self, id: i64) -> Result<(), AppError> {
        let mut targets = self.targets.lock();
        if let Some(target) = targets.iter_mut().find(|t| t.id == id) {
            target.active = false;
        }
        Ok(())
    }
}

/// Push gateway that records dispatches and answers with scripted outcomes.
#[derive(Default)]
pub struct RecordingPushGateway {
    pub outcomes: Mutex<HashMap<String, PushOutcome>>,
    pub dispatched: Mutex<Vec<(Vec<String>, PushNotification)>>,
}

impl RecordingPushGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, address: &str, outcome: PushOutcome) {
        self.outcomes.lock().insert(address.to_string(), outcome);
    }

    pub fn dispatched_addresses(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .iter()
            .flat_map(|(addresses, _)| addresses.clone())
            .collect()
    }
}

#[async_trait]
impl PushGateway for RecordingPushGateway {
    async fn dispatch(
        &self,
        addresses: &[String],
        notification: &PushNotification,
    ) -> Vec<PushOutcome> {
        self.dispatched
            .lock()
            .push((addresses.to_vec(), notification.clone()));
        addresses
            .iter()
            .map(|a| {
                self.outcomes
                    .lock()
                    .get(a)
                    .cloned()
                    .unwrap_or(PushOutcome::Delivered)
            })
            .collect()
    }
}

/// Records sweep deletions.
#[derive(Default)]
pub struct RecordingNotifier {
    pub deleted: Mutex<Vec<(ChannelRef, i64)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl DeletionNotifier for RecordingNotifier {
    fn message_deleted(&self, channel: ChannelRef, message_id: i64) {
        self.deleted.lock().push((channel, message_id));
    }
}

/// No identities needed by the delivery tests.
pub struct NoIdentities;

#[async_trait]
impl IdentityRepository for NoIdentities {
    async fn find_by_external_id(&self, _external_id: &str) -> Result<Option<i64>, AppError> {
        Ok(None)
    }
}

/// Pre-wired delivery engine over in-memory fakes.
pub struct EngineHarness {
    pub messages: Arc<InMemoryMessages>,
    pub participants: Arc<StaticParticipants>,
    pub retention: Arc<StaticRetention>,
    pub translator: Arc<EchoTranslator>,
    pub cache: Arc<InMemoryCache>,
    pub delivery: Arc<DeliveryService>,
}

impl EngineHarness {
    pub fn new() -> Self {
        let messages = InMemoryMessages::new();
        let participants = StaticParticipants::new();
        let retention = StaticRetention::new();
        let translator = EchoTranslator::new();
        let cache = InMemoryCache::new();

        let delivery = Arc::new(DeliveryService::new(
            messages.clone(),
            participants.clone(),
            retention.clone(),
            translator.clone(),
            cache.clone(),
            Arc::new(SnowflakeGenerator::new(1, 0)),
            4000,
        ));

        Self {
            messages,
            participants,
            retention,
            translator,
            cache,
            delivery,
        }
    }

    /// Conversation 7 between user 1 (en) and user 2 (fr).
    pub fn with_conversation(self) -> Self {
        self.participants
            .seed(ChannelRef::conversation(7), &[(1, "en"), (2, "fr")]);
        self
    }

    /// Room 9 with users 1 (en), 2 (fr), 3 (ko).
    pub fn with_room(self) -> Self {
        self.participants
            .seed(ChannelRef::room(9), &[(1, "en"), (2, "fr"), (3, "ko")]);
        self
    }
}

/// Server side of one fake client connection.
pub struct FakeServerSide {
    pub token: String,
    pub from_client: mpsc::UnboundedReceiver<ClientEvent>,
    pub to_client: mpsc::UnboundedSender<ServerEvent>,
}

impl FakeServerSide {
    pub fn ready(&self, user_id: i64, session_id: &str) {
        let _ = self.to_client.send(ServerEvent::Ready {
            user_id,
            session_id: session_id.to_string(),
        });
    }

    pub fn ack(&self, message_id: i64, idempotency_key: Option<String>) {
        let _ = self.to_client.send(ServerEvent::SendAck {
            message_id,
            idempotency_key,
        });
    }
}

struct FakeClientSide {
    tx: mpsc::UnboundedSender<ClientEvent>,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

#[async_trait]
impl Connection for FakeClientSide {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        self.tx
            .send(event.clone())
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }
}

/// In-process transport: each connect hands the server side to the test.
pub struct FakeTransport {
    accepts: mpsc::UnboundedSender<FakeServerSide>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeServerSide>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { accepts: tx }), rx)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, token: &str) -> Result<Box<dyn Connection>, TransportError> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        self.accepts
            .send(FakeServerSide {
                token: token.to_string(),
                from_client: server_rx,
                to_client: server_tx,
            })
            .map_err(|_| TransportError::Connect("acceptor gone".into()))?;
        Ok(Box::new(FakeClientSide {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}
