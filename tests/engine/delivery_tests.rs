//! Delivery Engine Tests
//!
//! Idempotent sends, translation behavior, authorization, and deletion.

use chrono::Utc;
use pretty_assertions::assert_eq;

use chat_relay::application::{DeliveryError, SendRequest};
use chat_relay::domain::{ChannelRef, RetentionPolicy};

use crate::common::EngineHarness;

fn request(content: &str, key: Option<&str>) -> SendRequest {
    SendRequest {
        content: content.to_string(),
        source_lang: None,
        idempotency_key: key.map(String::from),
    }
}

#[tokio::test]
async fn retry_with_same_key_returns_the_original_message() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);

    let first = h
        .delivery
        .send(channel, 1, request("hello", Some("key-1")))
        .await
        .unwrap();
    let second = h
        .delivery
        .send(channel, 1, request("hello", Some("key-1")))
        .await
        .unwrap();

    assert!(!first.deduplicated);
    assert!(second.deduplicated);
    assert_eq!(first.message.id, second.message.id);
    assert_eq!(h.messages.row_count(), 1);
}

#[tokio::test]
async fn concurrent_retries_with_same_key_create_one_row() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);

    let (a, b) = tokio::join!(
        h.delivery.send(channel, 1, request("racing", Some("key-r"))),
        h.delivery.send(channel, 1, request("racing", Some("key-r"))),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.message.id, b.message.id);
    assert_eq!(h.messages.row_count(), 1);
}

#[tokio::test]
async fn sends_without_a_key_are_never_deduplicated() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);

    h.delivery.send(channel, 1, request("a", None)).await.unwrap();
    h.delivery.send(channel, 1, request("a", None)).await.unwrap();

    assert_eq!(h.messages.row_count(), 2);
}

#[tokio::test]
async fn non_participant_cannot_send() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);

    let err = h
        .delivery
        .send(channel, 99, request("intruding", None))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Forbidden));
    assert_eq!(h.messages.row_count(), 0);
}

#[tokio::test]
async fn oversized_content_is_rejected() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);

    let err = h
        .delivery
        .send(channel, 1, request(&"x".repeat(4001), None))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::ContentTooLong));
}

#[tokio::test]
async fn conversation_messages_carry_an_eager_translation() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);

    // User 1 (en) writes to user 2 (fr): the stored message already holds the
    // recipient-language translation when the send resolves.
    let outcome = h
        .delivery
        .send(channel, 1, request("hello", None))
        .await
        .unwrap();

    assert_eq!(outcome.message.source_lang, "en");
    assert_eq!(outcome.message.translated_content.as_deref(), Some("[fr] hello"));
    assert_eq!(outcome.message.target_lang.as_deref(), Some("fr"));

    let stored = h.messages.get(outcome.message.id).unwrap();
    assert_eq!(stored.translated_content.as_deref(), Some("[fr] hello"));
}

#[tokio::test]
async fn same_language_conversation_skips_translation() {
    let h = EngineHarness::new();
    let channel = ChannelRef::conversation(8);
    h.participants.seed(channel, &[(1, "en"), (2, "en")]);

    let outcome = h
        .delivery
        .send(channel, 1, request("hello", None))
        .await
        .unwrap();

    assert_eq!(outcome.message.translated_content, None);
    assert_eq!(h.translator.call_count(), 0);
}

#[tokio::test]
async fn room_messages_store_the_original_only() {
    let h = EngineHarness::new().with_room();
    let channel = ChannelRef::room(9);

    let outcome = h
        .delivery
        .send(channel, 1, request("hello room", None))
        .await
        .unwrap();

    assert_eq!(outcome.message.translated_content, None);
    assert_eq!(h.translator.call_count(), 0);
}

#[tokio::test]
async fn room_reads_translate_on_demand_and_cache_per_language() {
    let h = EngineHarness::new().with_room();
    let channel = ChannelRef::room(9);

    let sent = h
        .delivery
        .send(channel, 1, request("hello room", None))
        .await
        .unwrap();

    let first = h
        .delivery
        .fetch_for_reader(channel, sent.message.id, "fr")
        .await
        .unwrap();
    assert_eq!(first.text, "[fr] hello room");

    // The second read in the same language hits the cache.
    let second = h
        .delivery
        .fetch_for_reader(channel, sent.message.id, "fr")
        .await
        .unwrap();
    assert_eq!(second.text, "[fr] hello room");
    assert_eq!(h.translator.call_count(), 1);

    // A different language pays for its own translation.
    let korean = h
        .delivery
        .fetch_for_reader(channel, sent.message.id, "ko")
        .await
        .unwrap();
    assert_eq!(korean.text, "[ko] hello room");
    assert_eq!(h.translator.call_count(), 2);
}

#[tokio::test]
async fn readers_in_the_source_language_get_the_original() {
    let h = EngineHarness::new().with_room();
    let channel = ChannelRef::room(9);

    let sent = h
        .delivery
        .send(channel, 1, request("hello room", None))
        .await
        .unwrap();

    let fetched = h
        .delivery
        .fetch_for_reader(channel, sent.message.id, "en")
        .await
        .unwrap();
    assert_eq!(fetched.text, "hello room");
    assert_eq!(h.translator.call_count(), 0);
}

#[tokio::test]
async fn room_override_beats_sender_default() {
    let h = EngineHarness::new().with_room();
    let channel = ChannelRef::room(9);
    h.retention
        .user_defaults
        .lock()
        .insert(1, RetentionPolicy::Never);
    h.retention
        .room_overrides
        .lock()
        .insert(9, RetentionPolicy::After(60));

    let outcome = h
        .delivery
        .send(channel, 1, request("short-lived", None))
        .await
        .unwrap();

    assert_eq!(outcome.message.retention, RetentionPolicy::After(60));
    assert!(outcome.message.expires_at.is_some());
}

#[tokio::test]
async fn only_the_sender_can_delete() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);

    let sent = h
        .delivery
        .send(channel, 1, request("regret", None))
        .await
        .unwrap();

    let err = h
        .delivery
        .delete_message(channel, 2, sent.message.id)
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Forbidden));

    h.delivery
        .delete_message(channel, 1, sent.message.id)
        .await
        .unwrap();

    // Deleted reads as gone.
    let err = h
        .delivery
        .fetch_for_reader(channel, sent.message.id, "en")
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::NotFound));

    // The row survives, redacted.
    let row = h.messages.get(sent.message.id).unwrap();
    assert!(row.deleted_at.is_some());
    assert_eq!(row.content, "");
}

#[tokio::test]
async fn source_language_falls_back_to_sender_profile() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);

    // User 2's profile language is fr; no explicit source_lang on the send.
    let outcome = h
        .delivery
        .send(channel, 2, request("bonjour", None))
        .await
        .unwrap();

    assert_eq!(outcome.message.source_lang, "fr");
    assert_eq!(outcome.message.target_lang.as_deref(), Some("en"));
}

#[tokio::test]
async fn fetch_rejects_channel_mismatch() {
    let h = EngineHarness::new().with_conversation().with_room();

    let sent = h
        .delivery
        .send(ChannelRef::conversation(7), 1, request("private", None))
        .await
        .unwrap();

    let err = h
        .delivery
        .fetch_for_reader(ChannelRef::room(9), sent.message.id, "en")
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::NotFound));
}

#[tokio::test]
async fn mark_read_is_inert_for_non_on_read_policies() {
    let h = EngineHarness::new().with_conversation();
    let channel = ChannelRef::conversation(7);

    let sent = h
        .delivery
        .send(channel, 1, request("kept forever", None))
        .await
        .unwrap();

    let set = h
        .delivery
        .mark_read(channel, 2, sent.message.id, Utc::now())
        .await
        .unwrap();
    assert!(!set);
    assert_eq!(h.messages.get(sent.message.id).unwrap().expires_at, None);
}
