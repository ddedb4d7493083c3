//! Retention Sweeper Tests
//!
//! Timed expiry, on-read expiry, and sweep idempotency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;

use chat_relay::application::{DeliveryError, RetentionSweeper, SendRequest};
use chat_relay::domain::{ChannelRef, Message, MessageRepository, RetentionPolicy};
use chat_relay::shared::error::AppError;

use crate::common::{EngineHarness, InMemoryMessages, RecordingNotifier};

fn expired_message(id: i64, channel: ChannelRef) -> Message {
    let now = Utc::now();
    Message {
        id,
        channel,
        sender_id: 1,
        content: "old".into(),
        source_lang: "en".into(),
        translated_content: None,
        target_lang: None,
        idempotency_key: None,
        retention: RetentionPolicy::After(60),
        expires_at: Some(now - chrono::Duration::seconds(5)),
        deleted_at: None,
        created_at: now - chrono::Duration::seconds(65),
    }
}

#[tokio::test]
async fn sweep_deletes_expired_messages_exactly_once() {
    let messages = InMemoryMessages::new();
    let notifier = RecordingNotifier::new();

    messages.insert(expired_message(1, ChannelRef::conversation(7)));
    messages.insert(expired_message(2, ChannelRef::room(9)));

    // Unexpired row stays.
    let mut fresh = expired_message(3, ChannelRef::room(9));
    fresh.expires_at = Some(Utc::now() + chrono::Duration::seconds(300));
    messages.insert(fresh);

    let sweeper = Arc::new(RetentionSweeper::new(
        messages.clone(),
        notifier.clone(),
        Duration::from_secs(60),
    ));

    let stats = sweeper.sweep_once().await.unwrap();
    assert_eq!(stats.conversations, 1);
    assert_eq!(stats.rooms, 1);

    let deleted = notifier.deleted.lock().clone();
    assert_eq!(deleted.len(), 2);
    assert!(deleted.contains(&(ChannelRef::conversation(7), 1)));
    assert!(deleted.contains(&(ChannelRef::room(9), 2)));

    assert!(messages.get(1).unwrap().deleted_at.is_some());
    assert!(messages.get(3).unwrap().deleted_at.is_none());

    // A second pass finds nothing new: no double delete, no re-notify.
    let stats = sweeper.sweep_once().await.unwrap();
    assert_eq!(stats.total(), 0);
    assert_eq!(notifier.deleted.lock().len(), 2);
}

#[tokio::test]
async fn sweep_redacts_content() {
    let messages = InMemoryMessages::new();
    let notifier = RecordingNotifier::new();
    messages.insert(expired_message(1, ChannelRef::room(9)));

    let sweeper = Arc::new(RetentionSweeper::new(
        messages.clone(),
        notifier,
        Duration::from_secs(60),
    ));
    sweeper.sweep_once().await.unwrap();

    let row = messages.get(1).unwrap();
    assert_eq!(row.content, "");
    assert_eq!(row.translated_content, None);
}

#[tokio::test]
async fn on_read_expiry_runs_end_to_end() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);
    h.retention
        .user_defaults
        .lock()
        .insert(1, RetentionPolicy::OnRead);

    let sent = h
        .delivery
        .send(
            channel,
            1,
            SendRequest {
                content: "burn after reading".into(),
                source_lang: None,
                idempotency_key: None,
            },
        )
        .await
        .unwrap();

    // Unread: no expiry, the sweeper must not touch it.
    assert_eq!(sent.message.retention, RetentionPolicy::OnRead);
    assert_eq!(sent.message.expires_at, None);

    let notifier = RecordingNotifier::new();
    let sweeper = Arc::new(RetentionSweeper::new(
        h.messages.clone(),
        notifier.clone(),
        Duration::from_secs(60),
    ));
    assert_eq!(sweeper.sweep_once().await.unwrap().total(), 0);

    // The sender reading back their own message does not start the clock.
    let set = h
        .delivery
        .mark_read(channel, 1, sent.message.id, Utc::now())
        .await
        .unwrap();
    assert!(!set);
    assert_eq!(h.messages.get(sent.message.id).unwrap().expires_at, None);

    // The other party's read freezes the expiry to the read timestamp.
    let read_at = Utc::now() - chrono::Duration::seconds(1);
    let set = h
        .delivery
        .mark_read(channel, 2, sent.message.id, read_at)
        .await
        .unwrap();
    assert!(set);
    assert_eq!(
        h.messages.get(sent.message.id).unwrap().expires_at,
        Some(read_at)
    );

    // A repeat read receipt does not move the expiry.
    let again = h
        .delivery
        .mark_read(channel, 2, sent.message.id, Utc::now())
        .await
        .unwrap();
    assert!(!again);
    assert_eq!(
        h.messages.get(sent.message.id).unwrap().expires_at,
        Some(read_at)
    );

    // The next sweep collects it, and reads see it as gone.
    let stats = sweeper.sweep_once().await.unwrap();
    assert_eq!(stats.conversations, 1);
    assert_eq!(
        notifier.deleted.lock().as_slice(),
        &[(channel, sent.message.id)]
    );

    let err = h
        .delivery
        .fetch_for_reader(channel, sent.message.id, "fr")
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::NotFound));
}

/// Store where an explicit user delete lands between the sweep's find and
/// its mark.
struct DeleteRaceStore {
    inner: Arc<InMemoryMessages>,
    victim: i64,
}

#[async_trait]
impl MessageRepository for DeleteRaceStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_idempotency_key(
        &self,
        channel: ChannelRef,
        key: &str,
    ) -> Result<Option<Message>, AppError> {
        self.inner.find_by_idempotency_key(channel, key).await
    }

    async fn create_idempotent(&self, message: &Message) -> Result<Message, AppError> {
        self.inner.create_idempotent(message).await
    }

    async fn set_translation(
        &self,
        id: i64,
        translated: &str,
        target_lang: &str,
    ) -> Result<(), AppError> {
        self.inner.set_translation(id, translated, target_lang).await
    }

    async fn set_expiry_on_read(
        &self,
        id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.inner.set_expiry_on_read(id, read_at).await
    }

    async fn find_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<Message>, AppError> {
        let expired = self.inner.find_expired_before(now).await?;
        // The victim's author deletes it right after the sweep saw it.
        self.inner.mark_deleted(&[self.victim], Utc::now()).await?;
        Ok(expired)
    }

    async fn mark_deleted(
        &self,
        ids: &[i64],
        deleted_at: DateTime<Utc>,
    ) -> Result<Vec<i64>, AppError> {
        self.inner.mark_deleted(ids, deleted_at).await
    }
}

#[tokio::test]
async fn concurrently_deleted_rows_are_not_renotified() {
    let inner = InMemoryMessages::new();
    inner.insert(expired_message(1, ChannelRef::room(9)));
    inner.insert(expired_message(2, ChannelRef::room(9)));

    let notifier = RecordingNotifier::new();
    let sweeper = Arc::new(RetentionSweeper::new(
        Arc::new(DeleteRaceStore {
            inner: inner.clone(),
            victim: 1,
        }),
        notifier.clone(),
        Duration::from_secs(60),
    ));

    // The explicit delete already announced message 1; the sweep only
    // broadcasts what it marked itself.
    let stats = sweeper.sweep_once().await.unwrap();
    assert_eq!(stats.total(), 1);
    assert_eq!(
        notifier.deleted.lock().as_slice(),
        &[(ChannelRef::room(9), 2)]
    );
}

#[tokio::test]
async fn outsiders_cannot_start_the_on_read_clock() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);
    h.retention
        .user_defaults
        .lock()
        .insert(1, RetentionPolicy::OnRead);

    let sent = h
        .delivery
        .send(
            channel,
            1,
            SendRequest {
                content: "burn after reading".into(),
                source_lang: None,
                idempotency_key: None,
            },
        )
        .await
        .unwrap();

    // User 99 is not in the conversation; their receipt must not schedule
    // someone else's message for deletion.
    let err = h
        .delivery
        .mark_read(channel, 99, sent.message.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Forbidden));
    assert_eq!(h.messages.get(sent.message.id).unwrap().expires_at, None);

    // The actual other party still can.
    let read_at = Utc::now();
    assert!(h
        .delivery
        .mark_read(channel, 2, sent.message.id, read_at)
        .await
        .unwrap());
    assert_eq!(
        h.messages.get(sent.message.id).unwrap().expires_at,
        Some(read_at)
    );
}

#[tokio::test]
async fn stats_split_by_channel_kind() {
    let messages = InMemoryMessages::new();
    messages.insert(expired_message(1, ChannelRef::conversation(7)));
    messages.insert(expired_message(2, ChannelRef::conversation(8)));
    messages.insert(expired_message(3, ChannelRef::room(9)));

    let sweeper = Arc::new(RetentionSweeper::new(
        messages,
        RecordingNotifier::new(),
        Duration::from_secs(60),
    ));

    let stats = sweeper.sweep_once().await.unwrap();
    assert_eq!(stats.conversations, 2);
    assert_eq!(stats.rooms, 1);
    assert_eq!(stats.total(), 3);
}
