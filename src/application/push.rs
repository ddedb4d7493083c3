//! Offline Delivery Fallback
//!
//! Dispatches a push notification to channel participants who have no live
//! session at broadcast time. Strictly best-effort: nothing here can fail or
//! roll back the message send that already completed. The one mutation this
//! component performs is deactivating targets the gateway reports as
//! permanently invalid.

use std::sync::Arc;

use serde_json::json;

use crate::domain::{Message, PushGateway, PushNotification, PushOutcome, PushTargetRepository};
use crate::infrastructure::metrics;

/// Offline push fallback service.
pub struct OfflinePushService {
    targets: Arc<dyn PushTargetRepository>,
    gateway: Arc<dyn PushGateway>,
    preview_length: usize,
}

impl OfflinePushService {
    pub fn new(
        targets: Arc<dyn PushTargetRepository>,
        gateway: Arc<dyn PushGateway>,
        preview_length: usize,
    ) -> Self {
        Self {
            targets,
            gateway,
            preview_length,
        }
    }

    /// Dispatch a preview of `message` to every active push target of the
    /// given offline users. Returns the number of dispatch attempts made;
    /// all failures are logged and swallowed.
    pub async fn notify_offline(&self, offline_user_ids: &[i64], message: &Message) -> usize {
        if offline_user_ids.is_empty() {
            return 0;
        }

        let targets = match self.targets.find_active_for_users(offline_user_ids).await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::warn!(error = %e, "Push target lookup failed, skipping fallback");
                return 0;
            }
        };

        if targets.is_empty() {
            return 0;
        }

        let notification = PushNotification {
            title: "New message".to_string(),
            body: truncate_preview(&message.content, self.preview_length),
            data: json!({
                "channel_kind": message.channel.kind.as_str(),
                "channel_id": message.channel.id,
                "message_id": message.id,
            }),
        };

        let addresses: Vec<String> = targets.iter().map(|t| t.address.clone()).collect();
        let outcomes = self.gateway.dispatch(&addresses, &notification).await;

        for (target, outcome) in targets.iter().zip(outcomes.iter()) {
            let label = match outcome {
                PushOutcome::Delivered => "delivered",
                PushOutcome::Failed => "failed",
                PushOutcome::Invalid => "invalid",
            };
            metrics::PUSH_DISPATCH_TOTAL.with_label_values(&[label]).inc();

            if *outcome == PushOutcome::Invalid {
                tracing::info!(
                    target_id = target.id,
                    user_id = target.user_id,
                    "Deactivating permanently invalid push target"
                );
                if let Err(e) = self.targets.deactivate(target.id).await {
                    tracing::warn!(target_id = target.id, error = %e, "Failed to deactivate push target");
                }
            }
        }

        tracing::debug!(
            message_id = message.id,
            attempts = targets.len(),
            "Offline fallback dispatched"
        );

        targets.len()
    }
}

/// Truncate content to a character-bounded preview.
fn truncate_preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let truncated: String = content.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{truncated}…")
}
