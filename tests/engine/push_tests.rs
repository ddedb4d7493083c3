//! Offline Push Fallback Tests

use chrono::Utc;
use pretty_assertions::assert_eq;

use chat_relay::application::OfflinePushService;
use chat_relay::domain::{ChannelRef, Message, PushOutcome, RetentionPolicy};

use crate::common::{InMemoryPushTargets, RecordingPushGateway};

fn message() -> Message {
    Message {
        id: 100,
        channel: ChannelRef::room(9),
        sender_id: 1,
        content: "did anyone see this?".into(),
        source_lang: "en".into(),
        translated_content: None,
        target_lang: None,
        idempotency_key: None,
        retention: RetentionPolicy::Never,
        expires_at: None,
        deleted_at: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn every_active_target_of_every_offline_user_gets_a_push() {
    let targets = InMemoryPushTargets::new();
    let gateway = RecordingPushGateway::new();

    targets.add(2, "device-2a");
    targets.add(2, "device-2b");
    targets.add(3, "device-3");
    // User 4 is offline too but never registered a device.
    // User 5 is online; their target must not be dispatched to.
    targets.add(5, "device-5");

    let service = OfflinePushService::new(targets, gateway.clone(), 120);
    let attempts = service.notify_offline(&[2, 3, 4], &message()).await;

    assert_eq!(attempts, 3);
    let mut addresses = gateway.dispatched_addresses();
    addresses.sort();
    assert_eq!(addresses, vec!["device-2a", "device-2b", "device-3"]);
}

#[tokio::test]
async fn push_payload_references_the_message() {
    let targets = InMemoryPushTargets::new();
    let gateway = RecordingPushGateway::new();
    targets.add(2, "device-2");

    let service = OfflinePushService::new(targets, gateway.clone(), 120);
    service.notify_offline(&[2], &message()).await;

    let dispatched = gateway.dispatched.lock();
    let (_, notification) = &dispatched[0];
    assert_eq!(notification.body, "did anyone see this?");
    assert_eq!(notification.data["message_id"], 100);
    assert_eq!(notification.data["channel_kind"], "room");
    assert_eq!(notification.data["channel_id"], 9);
}

#[tokio::test]
async fn invalid_targets_are_deactivated_and_skipped_afterwards() {
    let targets = InMemoryPushTargets::new();
    let gateway = RecordingPushGateway::new();

    let good = targets.add(2, "device-good");
    let stale = targets.add(2, "device-stale");
    gateway.script("device-stale", PushOutcome::Invalid);

    let service = OfflinePushService::new(targets.clone(), gateway.clone(), 120);
    let attempts = service.notify_offline(&[2], &message()).await;
    assert_eq!(attempts, 2);

    assert!(targets.is_active(good));
    assert!(!targets.is_active(stale));

    // The deactivated target drops out of the next fan-out.
    let attempts = service.notify_offline(&[2], &message()).await;
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn transient_failures_keep_the_target_active() {
    let targets = InMemoryPushTargets::new();
    let gateway = RecordingPushGateway::new();

    let flaky = targets.add(2, "device-flaky");
    gateway.script("device-flaky", PushOutcome::Failed);

    let service = OfflinePushService::new(targets.clone(), gateway, 120);
    service.notify_offline(&[2], &message()).await;

    assert!(targets.is_active(flaky));
}

#[tokio::test]
async fn no_offline_users_means_no_dispatch() {
    let targets = InMemoryPushTargets::new();
    let gateway = RecordingPushGateway::new();
    targets.add(2, "device-2");

    let service = OfflinePushService::new(targets, gateway.clone(), 120);
    let attempts = service.notify_offline(&[], &message()).await;

    assert_eq!(attempts, 0);
    assert!(gateway.dispatched.lock().is_empty());
}

#[tokio::test]
async fn long_previews_are_truncated() {
    let targets = InMemoryPushTargets::new();
    let gateway = RecordingPushGateway::new();
    targets.add(2, "device-2");

    let mut long = message();
    long.content = "a".repeat(500);

    let service = OfflinePushService::new(targets, gateway.clone(), 120);
    service.notify_offline(&[2], &long).await;

    let dispatched = gateway.dispatched.lock();
    let (_, notification) = &dispatched[0];
    assert_eq!(notification.body.chars().count(), 120);
    assert!(notification.body.ends_with('…'));
}
