//! Retention Sweeper
//!
//! A repeating background task that soft-deletes messages past their expiry.
//! The sweeper is the only component besides the delivery engine that writes
//! message rows, and it runs with no shared locking against it: a sweep
//! racing an in-flight send of an unrelated message is expected and harmless.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::{ChannelKind, ChannelRef, MessageRepository};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Receives soft-deletion notifications for live broadcast.
///
/// Implemented by the WebSocket gateway so currently-joined sessions observe
/// `message_deleted` events; a no-op implementation is fine for tests.
pub trait DeletionNotifier: Send + Sync {
    fn message_deleted(&self, channel: ChannelRef, message_id: i64);
}

/// Per-sweep outcome counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub conversations: u64,
    pub rooms: u64,
}

impl SweepStats {
    pub fn total(&self) -> u64 {
        self.conversations + self.rooms
    }
}

/// Background retention sweeper.
pub struct RetentionSweeper {
    messages: Arc<dyn MessageRepository>,
    notifier: Arc<dyn DeletionNotifier>,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        notifier: Arc<dyn DeletionNotifier>,
        interval: Duration,
    ) -> Self {
        Self {
            messages,
            notifier,
            interval,
        }
    }

    /// Spawn the repeating sweep loop. A failed sweep is logged and the loop
    /// continues on its next tick; it never stops permanently.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The immediate first tick would sweep before startup settles.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.sweep_once().await {
                    Ok(stats) if stats.total() > 0 => {
                        tracing::info!(
                            conversations = stats.conversations,
                            rooms = stats.rooms,
                            "Retention sweep deleted expired messages"
                        );
                    }
                    Ok(_) => {
                        tracing::debug!("Retention sweep found nothing to delete");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Retention sweep failed, will retry next tick");
                    }
                }
            }
        })
    }

    /// Run one sweep: find messages whose expiry is at or before now, mark
    /// them soft-deleted, and notify live channel members.
    pub async fn sweep_once(&self) -> Result<SweepStats, AppError> {
        let now = Utc::now();
        let expired = self.messages.find_expired_before(now).await?;

        if expired.is_empty() {
            return Ok(SweepStats::default());
        }

        let ids: Vec<i64> = expired.iter().map(|m| m.id).collect();
        let marked = self.messages.mark_deleted(&ids, now).await?;

        // Another writer may delete a row between the find and the mark;
        // only rows this sweep actually marked are broadcast, so no message
        // is ever announced deleted twice.
        let channels: HashMap<i64, ChannelRef> =
            expired.iter().map(|m| (m.id, m.channel)).collect();

        let mut stats = SweepStats::default();
        let mut per_kind: HashMap<ChannelKind, u64> = HashMap::new();

        for id in &marked {
            if let Some(channel) = channels.get(id) {
                self.notifier.message_deleted(*channel, *id);
                *per_kind.entry(channel.kind).or_default() += 1;
            }
        }

        stats.conversations = per_kind
            .get(&ChannelKind::Conversation)
            .copied()
            .unwrap_or(0);
        stats.rooms = per_kind.get(&ChannelKind::Room).copied().unwrap_or(0);

        metrics::SWEEP_DELETED_TOTAL
            .with_label_values(&["conversation"])
            .inc_by(stats.conversations);
        metrics::SWEEP_DELETED_TOTAL
            .with_label_values(&["room"])
            .inc_by(stats.rooms);

        tracing::debug!(
            expired = expired.len(),
            marked = marked.len(),
            "Retention sweep pass complete"
        );

        Ok(stats)
    }
}

/// A notifier that drops deletions, for contexts with no live gateway.
pub struct NoopDeletionNotifier;

impl DeletionNotifier for NoopDeletionNotifier {
    fn message_deleted(&self, _channel: ChannelRef, _message_id: i64) {}
}
