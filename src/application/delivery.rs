//! Message Delivery Engine
//!
//! The persistence half of the delivery path: idempotent message creation,
//! retention policy resolution, eager conversation translation, lazy room
//! translation, and read receipts. Broadcast fan-out and acknowledgment
//! ordering live in the WebSocket handler, which calls into this service.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    ChannelKind, ChannelRef, Message, MessageRepository, ParticipantRepository, RetentionPolicy,
    RetentionPolicyRepository, TranslationCache, TranslationClient,
};
use crate::infrastructure::metrics;
use crate::shared::snowflake::SnowflakeGenerator;

/// A send request as it arrives from a session.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub content: String,
    /// Language tag of the content; falls back to the sender's profile
    /// language when absent.
    pub source_lang: Option<String>,
    /// Client-generated dedup token, reused verbatim across retries of one
    /// logical send.
    pub idempotency_key: Option<String>,
}

/// The result of a send: the persisted (or deduplicated) message.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: Message,
    /// True when the idempotency key matched an existing row and no new
    /// message was created.
    pub deduplicated: bool,
}

/// A message resolved for one reader, with the text in their language.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub message: Message,
    pub text: String,
}

/// Delivery engine errors
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Message not found")]
    NotFound,

    #[error("Not a participant of this channel")]
    Forbidden,

    #[error("Message too long")]
    ContentTooLong,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Message delivery service.
pub struct DeliveryService {
    messages: Arc<dyn MessageRepository>,
    participants: Arc<dyn ParticipantRepository>,
    retention: Arc<dyn RetentionPolicyRepository>,
    translator: Arc<dyn TranslationClient>,
    translation_cache: Arc<dyn TranslationCache>,
    id_generator: Arc<SnowflakeGenerator>,
    max_content_length: usize,
}

impl DeliveryService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        participants: Arc<dyn ParticipantRepository>,
        retention: Arc<dyn RetentionPolicyRepository>,
        translator: Arc<dyn TranslationClient>,
        translation_cache: Arc<dyn TranslationCache>,
        id_generator: Arc<SnowflakeGenerator>,
        max_content_length: usize,
    ) -> Self {
        Self {
            messages,
            participants,
            retention,
            translator,
            translation_cache,
            id_generator,
            max_content_length,
        }
    }

    /// Process one send request.
    ///
    /// At-least-once with dedup: a retry carrying the same idempotency key
    /// resolves to the already-persisted message instead of creating a second
    /// row, both on the fast path (lookup) and under a concurrent retry storm
    /// (storage-level uniqueness, see `MessageRepository::create_idempotent`).
    pub async fn send(
        &self,
        channel: ChannelRef,
        sender_id: i64,
        request: SendRequest,
    ) -> Result<SendOutcome, DeliveryError> {
        if request.content.chars().count() > self.max_content_length {
            return Err(DeliveryError::ContentTooLong);
        }

        // Fast path: the retry of an already-acknowledged send.
        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = self
                .messages
                .find_by_idempotency_key(channel, key)
                .await
                .map_err(|e| DeliveryError::Internal(e.to_string()))?
            {
                metrics::MESSAGES_DELIVERED_TOTAL
                    .with_label_values(&["deduplicated"])
                    .inc();
                tracing::debug!(
                    message_id = existing.id,
                    key = key,
                    "Send deduplicated by idempotency key"
                );
                return Ok(SendOutcome {
                    message: existing,
                    deduplicated: true,
                });
            }
        }

        let members = self
            .participants
            .participants(channel)
            .await
            .map_err(|e| DeliveryError::Internal(e.to_string()))?;

        let sender = members
            .iter()
            .find(|p| p.user_id == sender_id)
            .ok_or(DeliveryError::Forbidden)?;

        let source_lang = request
            .source_lang
            .clone()
            .unwrap_or_else(|| sender.language.clone());

        let policy = self.resolve_policy(channel, sender_id).await?;
        let now = Utc::now();

        let message = Message {
            id: self.id_generator.generate(),
            channel,
            sender_id,
            content: request.content,
            source_lang: source_lang.clone(),
            translated_content: None,
            target_lang: None,
            idempotency_key: request.idempotency_key,
            retention: policy,
            // On-read policies keep a NULL expiry until the read receipt.
            expires_at: policy.expiry_at_send(now),
            deleted_at: None,
            created_at: now,
        };

        let mut persisted = self
            .messages
            .create_idempotent(&message)
            .await
            .map_err(|e| DeliveryError::Internal(e.to_string()))?;

        // A different id back means we lost a retry race; the winner's row
        // already went through the translation step.
        if persisted.id != message.id {
            metrics::MESSAGES_DELIVERED_TOTAL
                .with_label_values(&["deduplicated"])
                .inc();
            return Ok(SendOutcome {
                message: persisted,
                deduplicated: true,
            });
        }

        // Conversations translate eagerly, before the sender is acknowledged.
        // Rooms store the original only; readers translate on demand.
        if channel.is_conversation() {
            if let Some(other) = members.iter().find(|p| p.user_id != sender_id) {
                if other.language != source_lang {
                    let translated = self
                        .translator
                        .translate(&persisted.content, &source_lang, &other.language)
                        .await;
                    self.messages
                        .set_translation(persisted.id, &translated, &other.language)
                        .await
                        .map_err(|e| DeliveryError::Internal(e.to_string()))?;
                    persisted.translated_content = Some(translated);
                    persisted.target_lang = Some(other.language.clone());
                }
            }
        }

        metrics::MESSAGES_DELIVERED_TOTAL
            .with_label_values(&["created"])
            .inc();
        tracing::debug!(
            message_id = persisted.id,
            channel = %channel,
            sender_id = sender_id,
            "Message persisted"
        );

        Ok(SendOutcome {
            message: persisted,
            deduplicated: false,
        })
    }

    /// Record a read receipt.
    ///
    /// For on-read retention this is the moment the expiry gets computed: the
    /// first read by a party other than the sender freezes `expires_at` to
    /// the read timestamp, and the next sweep collects the message. Only a
    /// participant of the channel can record a receipt; anyone else starting
    /// the deletion clock would be a destructive write. Returns whether an
    /// expiry was set.
    pub async fn mark_read(
        &self,
        channel: ChannelRef,
        reader_id: i64,
        message_id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<bool, DeliveryError> {
        let is_member = self
            .participants
            .is_participant(channel, reader_id)
            .await
            .map_err(|e| DeliveryError::Internal(e.to_string()))?;
        if !is_member {
            return Err(DeliveryError::Forbidden);
        }

        let message = self
            .messages
            .find_by_id(message_id)
            .await
            .map_err(|e| DeliveryError::Internal(e.to_string()))?
            .ok_or(DeliveryError::NotFound)?;

        if message.channel != channel {
            return Err(DeliveryError::NotFound);
        }

        // A sender reading back their own message does not start the clock.
        if message.sender_id == reader_id {
            return Ok(false);
        }

        if !message.retention.is_on_read() {
            return Ok(false);
        }

        self.messages
            .set_expiry_on_read(message_id, read_at)
            .await
            .map_err(|e| DeliveryError::Internal(e.to_string()))
    }

    /// Resolve a message for one reader, translating room messages on demand.
    ///
    /// Room translations are cached per (message id, target language) so a
    /// busy room pays for each language once. Deleted and expired messages
    /// read as not-found.
    pub async fn fetch_for_reader(
        &self,
        channel: ChannelRef,
        message_id: i64,
        target_lang: &str,
    ) -> Result<FetchedMessage, DeliveryError> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await
            .map_err(|e| DeliveryError::Internal(e.to_string()))?
            .ok_or(DeliveryError::NotFound)?;

        if message.channel != channel || message.is_deleted() || message.is_expired_at(Utc::now())
        {
            return Err(DeliveryError::NotFound);
        }

        if message.source_lang == target_lang {
            let text = message.content.clone();
            return Ok(FetchedMessage { message, text });
        }

        // Conversations already carry their eager translation.
        if message.channel.is_conversation() {
            let text = message.text_for(target_lang).to_string();
            return Ok(FetchedMessage { message, text });
        }

        match self.translation_cache.get(message.id, target_lang).await {
            Ok(Some(cached)) => {
                return Ok(FetchedMessage {
                    message,
                    text: cached,
                })
            }
            Ok(None) => {}
            Err(e) => {
                // Cache trouble degrades to a fresh translation.
                tracing::warn!(message_id = message.id, error = %e, "Translation cache read failed");
            }
        }

        let translated = self
            .translator
            .translate(&message.content, &message.source_lang, target_lang)
            .await;

        if let Err(e) = self
            .translation_cache
            .put(message.id, target_lang, &translated)
            .await
        {
            tracing::warn!(message_id = message.id, error = %e, "Translation cache write failed");
        }

        Ok(FetchedMessage {
            message,
            text: translated,
        })
    }

    /// Soft-delete a message on the author's request.
    ///
    /// Only the sender may delete their own message. The row is redacted and
    /// kept for dedup bookkeeping; subsequent reads see not-found.
    pub async fn delete_message(
        &self,
        channel: ChannelRef,
        actor_id: i64,
        message_id: i64,
    ) -> Result<(), DeliveryError> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await
            .map_err(|e| DeliveryError::Internal(e.to_string()))?
            .ok_or(DeliveryError::NotFound)?;

        if message.channel != channel || message.is_deleted() {
            return Err(DeliveryError::NotFound);
        }

        if message.sender_id != actor_id {
            return Err(DeliveryError::Forbidden);
        }

        self.messages
            .mark_deleted(&[message_id], Utc::now())
            .await
            .map_err(|e| DeliveryError::Internal(e.to_string()))?;

        tracing::debug!(message_id = message_id, actor_id = actor_id, "Message deleted");
        Ok(())
    }

    async fn resolve_policy(
        &self,
        channel: ChannelRef,
        sender_id: i64,
    ) -> Result<RetentionPolicy, DeliveryError> {
        let room_override = match channel.kind {
            ChannelKind::Room => self
                .retention
                .room_override(channel.id)
                .await
                .map_err(|e| DeliveryError::Internal(e.to_string()))?,
            ChannelKind::Conversation => None,
        };

        let sender_default = self
            .retention
            .user_default(sender_id)
            .await
            .map_err(|e| DeliveryError::Internal(e.to_string()))?;

        Ok(RetentionPolicy::resolve(room_override, sender_default))
    }
}
