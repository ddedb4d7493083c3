//! Push notification gateway collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-target delivery outcome reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    /// Accepted by the gateway for delivery
    Delivered,
    /// Transient failure; the target stays active
    Failed,
    /// Device unregistered or credentials revoked; the target must be
    /// deactivated so future dispatches skip it
    Invalid,
}

/// A notification payload dispatched to offline recipients.
#[derive(Debug, Clone, Serialize)]
pub struct PushNotification {
    pub title: String,
    /// Truncated preview of the message content
    pub body: String,
    /// Channel/message reference the client uses for deep linking
    pub data: serde_json::Value,
}

/// External push notification gateway.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Dispatch `notification` to each opaque address. The returned outcomes
    /// correspond to `addresses` by position.
    async fn dispatch(
        &self,
        addresses: &[String],
        notification: &PushNotification,
    ) -> Vec<PushOutcome>;
}
