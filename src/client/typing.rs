//! Typing Indicator Tracker
//!
//! Client-side bookkeeping for the ephemeral typing signal: rate-limits the
//! start events while the user keeps typing, and reports when a stop should
//! be emitted because the keyboard went quiet. Nothing here touches storage;
//! a dropped stop event just ages out on the receiving side.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::ChannelRef;

/// How long a typing signal stays fresh without a new keystroke.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// Tracks which channels this client is currently typing in.
pub struct TypingTracker {
    active: Mutex<HashMap<ChannelRef, Instant>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Record a keystroke. Returns true when a `typing_start` should go on
    /// the wire: the first keystroke, or the first after the signal expired.
    pub fn keystroke(&self, channel: ChannelRef) -> bool {
        self.keystroke_at(channel, Instant::now())
    }

    fn keystroke_at(&self, channel: ChannelRef, now: Instant) -> bool {
        let mut active = self.active.lock();
        let expired = active
            .get(&channel)
            .map(|last| now.duration_since(*last) >= TYPING_EXPIRY)
            .unwrap_or(true);
        active.insert(channel, now);
        expired
    }

    /// Explicit stop (message sent or input cleared). Returns true when a
    /// `typing_stop` should go on the wire.
    pub fn stop(&self, channel: ChannelRef) -> bool {
        self.active.lock().remove(&channel).is_some()
    }

    /// Channels whose signal went stale; the caller emits `typing_stop` for
    /// each. Stale entries are dropped.
    pub fn expire(&self) -> Vec<ChannelRef> {
        self.expire_at(Instant::now())
    }

    fn expire_at(&self, now: Instant) -> Vec<ChannelRef> {
        let mut active = self.active.lock();
        let stale: Vec<ChannelRef> = active
            .iter()
            .filter(|(_, last)| now.duration_since(**last) >= TYPING_EXPIRY)
            .map(|(channel, _)| *channel)
            .collect();
        for channel in &stale {
            active.remove(channel);
        }
        stale
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}
