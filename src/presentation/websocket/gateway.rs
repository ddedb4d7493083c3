//! WebSocket Gateway
//!
//! The in-memory connection registry: which sessions are live, which user
//! each belongs to, and which channels each has joined. Owned by the server
//! process and injected wherever needed, so tests construct isolated
//! instances. Membership here reflects *currently connected* participation
//! only; authorization lives in the persisted participant table.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::events::ServerEvent;
use crate::application::retention::DeletionNotifier;
use crate::domain::ChannelRef;
use crate::infrastructure::metrics;

/// Connected session with its outgoing message sender
pub struct ConnectedSession {
    pub user_id: i64,
    pub session_id: String,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

/// WebSocket gateway managing all live connections
pub struct Gateway {
    /// Active sessions by session_id
    sessions: DashMap<String, ConnectedSession>,
    /// User ID to session IDs mapping (one user can have multiple sessions).
    /// Doubles as the presence index for the offline fallback.
    user_sessions: DashMap<i64, Vec<String>>,
    /// Channel to session IDs mapping (for broadcast fan-out)
    channel_sessions: DashMap<ChannelRef, Vec<String>>,
    /// Session ID to joined channels (for idempotent join and disconnect cleanup)
    session_channels: DashMap<String, HashSet<ChannelRef>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            user_sessions: DashMap::new(),
            channel_sessions: DashMap::new(),
            session_channels: DashMap::new(),
        }
    }

    /// Register a new authenticated session
    pub fn register_session(
        &self,
        session_id: String,
        user_id: i64,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.sessions.insert(
            session_id.clone(),
            ConnectedSession {
                user_id,
                session_id: session_id.clone(),
                sender,
            },
        );

        self.user_sessions
            .entry(user_id)
            .or_default()
            .push(session_id.clone());

        self.session_channels.insert(session_id.clone(), HashSet::new());

        metrics::SESSIONS_ACTIVE.set(self.sessions.len() as i64);

        tracing::info!(
            user_id = user_id,
            session_id = %session_id,
            "Session registered"
        );
    }

    /// Unregister a session on disconnect.
    ///
    /// The session implicitly leaves every channel it had joined, and the
    /// remaining members of each observe exactly one `member_left` event for
    /// it. Returns the channels that were left.
    pub fn unregister_session(&self, session_id: &str) -> Vec<ChannelRef> {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return Vec::new();
        };

        if let Some(mut sessions) = self.user_sessions.get_mut(&session.user_id) {
            sessions.retain(|s| s != session_id);
        }

        let joined: Vec<ChannelRef> = self
            .session_channels
            .remove(session_id)
            .map(|(_, channels)| channels.into_iter().collect())
            .unwrap_or_default();

        for channel in &joined {
            if let Some(mut sessions) = self.channel_sessions.get_mut(channel) {
                sessions.retain(|s| s != session_id);
            }
            self.broadcast(
                *channel,
                ServerEvent::MemberLeft {
                    channel: *channel,
                    user_id: session.user_id,
                },
            );
        }

        metrics::SESSIONS_ACTIVE.set(self.sessions.len() as i64);

        tracing::info!(
            user_id = session.user_id,
            session_id = %session_id,
            channels = joined.len(),
            "Session unregistered"
        );

        joined
    }

    /// Add a session to a channel's broadcast group.
    ///
    /// Idempotent: a second join by the same session neither double-counts
    /// nor re-notifies. Other current members receive `member_joined` on the
    /// first join only. Returns whether the session newly joined.
    pub fn join(&self, session_id: &str, channel: ChannelRef) -> bool {
        let Some(session) = self.sessions.get(session_id) else {
            return false;
        };
        let user_id = session.user_id;
        drop(session);

        let newly_joined = self
            .session_channels
            .get_mut(session_id)
            .map(|mut channels| channels.insert(channel))
            .unwrap_or(false);

        if !newly_joined {
            return false;
        }

        // Notify existing members before the joiner is in the fan-out set.
        self.broadcast(channel, ServerEvent::MemberJoined { channel, user_id });

        self.channel_sessions
            .entry(channel)
            .or_default()
            .push(session_id.to_string());

        tracing::debug!(user_id = user_id, channel = %channel, "Joined channel");
        true
    }

    /// Remove a session from a channel's broadcast group.
    ///
    /// Returns whether the session was joined. Remaining members receive
    /// `member_left`.
    pub fn leave(&self, session_id: &str, channel: ChannelRef) -> bool {
        let Some(session) = self.sessions.get(session_id) else {
            return false;
        };
        let user_id = session.user_id;
        drop(session);

        let was_joined = self
            .session_channels
            .get_mut(session_id)
            .map(|mut channels| channels.remove(&channel))
            .unwrap_or(false);

        if !was_joined {
            return false;
        }

        if let Some(mut sessions) = self.channel_sessions.get_mut(&channel) {
            sessions.retain(|s| s != session_id);
        }

        self.broadcast(channel, ServerEvent::MemberLeft { channel, user_id });

        tracing::debug!(user_id = user_id, channel = %channel, "Left channel");
        true
    }

    /// Whether a session has joined a channel
    pub fn is_joined(&self, session_id: &str, channel: ChannelRef) -> bool {
        self.session_channels
            .get(session_id)
            .map(|channels| channels.contains(&channel))
            .unwrap_or(false)
    }

    /// Broadcast an event to every session joined to a channel
    pub fn broadcast(&self, channel: ChannelRef, event: ServerEvent) {
        if let Some(session_ids) = self.channel_sessions.get(&channel) {
            for session_id in session_ids.iter() {
                if let Some(session) = self.sessions.get(session_id) {
                    let _ = session.sender.send(event.clone());
                }
            }
        }
    }

    /// Broadcast to a channel, skipping one session (typing indicators and
    /// membership notifications go to *other* members)
    pub fn broadcast_except(&self, channel: ChannelRef, except: &str, event: ServerEvent) {
        if let Some(session_ids) = self.channel_sessions.get(&channel) {
            for session_id in session_ids.iter() {
                if session_id == except {
                    continue;
                }
                if let Some(session) = self.sessions.get(session_id) {
                    let _ = session.sender.send(event.clone());
                }
            }
        }
    }

    /// Send an event directly to one session
    pub fn send_to_session(&self, session_id: &str, event: ServerEvent) -> bool {
        if let Some(session) = self.sessions.get(session_id) {
            session.sender.send(event).is_ok()
        } else {
            false
        }
    }

    /// Check if user is online (has at least one live session).
    ///
    /// This is the presence index the offline fallback consults; no scan of
    /// live connections is involved.
    pub fn is_user_online(&self, user_id: i64) -> bool {
        self.user_sessions
            .get(&user_id)
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }

    /// Get session count
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl DeletionNotifier for Gateway {
    fn message_deleted(&self, channel: ChannelRef, message_id: i64) {
        self.broadcast(
            channel,
            ServerEvent::MessageDeleted {
                channel,
                message_id,
            },
        );
    }
}
