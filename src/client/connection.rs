//! Client Connection Manager
//!
//! Owns the socket lifecycle: connect, authenticate, re-join, and reconnect
//! with capped exponential backoff. Consumers never touch the socket; they
//! subscribe to the typed event stream and enqueue outgoing events. Dropping
//! a subscription receiver unsubscribes it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::transport::{Connection, Transport};
use crate::domain::ChannelRef;
use crate::presentation::websocket::{ClientEvent, ServerEvent};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 256;

/// Client-side errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected")]
    Disconnected,

    #[error("client closed")]
    Closed,

    #[error("credential minting failed: {0}")]
    Credential(String),
}

/// Where the connection lifecycle currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready { user_id: i64, session_id: String },
    /// Terminal: closed by the caller, or rejected with a non-retryable
    /// credential failure.
    Closed,
}

/// Mints a fresh credential for each connection attempt, so an expired token
/// never wedges the reconnect loop.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn token(&self) -> Result<String, ClientError>;
}

/// A credential that never changes; fine for tests and short-lived tools.
pub struct StaticCredential(pub String);

#[async_trait]
impl CredentialSource for StaticCredential {
    async fn token(&self) -> Result<String, ClientError> {
        Ok(self.0.clone())
    }
}

struct ClientInner {
    state: RwLock<ConnectionState>,
    /// Channels to re-join automatically after every reconnect.
    joined: Mutex<HashSet<ChannelRef>>,
    events: broadcast::Sender<ServerEvent>,
    /// In-flight sends awaiting acknowledgment, keyed by idempotency key.
    pending_acks: Mutex<HashMap<String, oneshot::Sender<i64>>>,
    outgoing: mpsc::UnboundedSender<ClientEvent>,
    shutdown: watch::Sender<bool>,
}

/// Handle to a managed relay connection.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    /// Start the connection manager. Returns immediately; the run loop keeps
    /// dialing in the background until `close` or a terminal rejection.
    pub fn connect(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(ClientInner {
            state: RwLock::new(ConnectionState::Disconnected),
            joined: Mutex::new(HashSet::new()),
            events,
            pending_acks: Mutex::new(HashMap::new()),
            outgoing: outgoing_tx,
            shutdown: shutdown_tx,
        });

        tokio::spawn(run_loop(
            Arc::clone(&inner),
            transport,
            credentials,
            outgoing_rx,
            shutdown_rx,
        ));

        Self { inner }
    }

    /// Subscribe to the server event stream. Dropping the receiver
    /// unsubscribes; a slow receiver that lags loses the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.read().clone()
    }

    /// Enqueue an event for the live connection. Fails immediately when not
    /// connected instead of buffering into the void.
    pub fn try_send(&self, event: ClientEvent) -> Result<(), ClientError> {
        match &*self.inner.state.read() {
            ConnectionState::Ready { .. } => {}
            ConnectionState::Closed => return Err(ClientError::Closed),
            _ => return Err(ClientError::Disconnected),
        }
        self.inner
            .outgoing
            .send(event)
            .map_err(|_| ClientError::Closed)
    }

    /// Join a channel. The membership is remembered and re-established after
    /// every reconnect.
    pub fn join(&self, channel: ChannelRef) -> Result<(), ClientError> {
        self.inner.joined.lock().insert(channel);
        self.try_send(ClientEvent::Join { channel })
    }

    pub fn leave(&self, channel: ChannelRef) -> Result<(), ClientError> {
        self.inner.joined.lock().remove(&channel);
        self.try_send(ClientEvent::Leave { channel })
    }

    /// Register interest in the ack for an idempotency key. The returned
    /// receiver resolves to the acknowledged message id.
    pub(crate) fn register_ack(&self, key: String) -> oneshot::Receiver<i64> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending_acks.lock().insert(key, tx);
        rx
    }

    /// Drop a pending ack registration (attempt timed out or was cancelled).
    pub(crate) fn discard_ack(&self, key: &str) {
        self.inner.pending_acks.lock().remove(key);
    }

    /// Stop reconnecting and tear the connection down.
    pub fn close(&self) {
        *self.inner.state.write() = ConnectionState::Closed;
        let _ = self.inner.shutdown.send(true);
    }
}

async fn run_loop(
    inner: Arc<ClientInner>,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    mut outgoing: mpsc::UnboundedReceiver<ClientEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = INITIAL_BACKOFF;

    'reconnect: loop {
        if *shutdown.borrow() {
            break;
        }

        *inner.state.write() = ConnectionState::Connecting;

        // A fresh credential per attempt: an expired token is retryable
        // precisely because the next mint fixes it.
        let token = match credentials.token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Credential minting failed");
                backoff = sleep_backoff(backoff, &mut shutdown).await;
                continue;
            }
        };

        let dialed = tokio::select! {
            dialed = transport.connect(&token) => dialed,
            _ = shutdown.changed() => break 'reconnect,
        };
        let mut conn = match dialed {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(error = %e, "Connect attempt failed");
                *inner.state.write() = ConnectionState::Disconnected;
                backoff = sleep_backoff(backoff, &mut shutdown).await;
                continue;
            }
        };

        // Handshake: the server answers with ready or a terminal error.
        let handshake = tokio::select! {
            handshake = await_ready(conn.as_mut()) => handshake,
            _ = shutdown.changed() => break 'reconnect,
        };
        match handshake {
            Handshake::Ready { user_id, session_id } => {
                tracing::info!(user_id = user_id, session_id = %session_id, "Connection ready");
                *inner.state.write() = ConnectionState::Ready {
                    user_id,
                    session_id,
                };
                backoff = INITIAL_BACKOFF;
            }
            Handshake::Rejected { retryable: false, reason } => {
                tracing::error!(reason = %reason, "Rejected with non-retryable credential failure");
                *inner.state.write() = ConnectionState::Closed;
                break 'reconnect;
            }
            Handshake::Rejected { retryable: true, reason } => {
                tracing::warn!(reason = %reason, "Rejected, will retry with fresh credential");
                *inner.state.write() = ConnectionState::Disconnected;
                backoff = sleep_backoff(backoff, &mut shutdown).await;
                continue;
            }
            Handshake::Dropped => {
                *inner.state.write() = ConnectionState::Disconnected;
                backoff = sleep_backoff(backoff, &mut shutdown).await;
                continue;
            }
        }

        // Re-establish channel membership before pumping events.
        let joined: Vec<ChannelRef> = inner.joined.lock().iter().copied().collect();
        for channel in joined {
            if conn.send(&ClientEvent::Join { channel }).await.is_err() {
                *inner.state.write() = ConnectionState::Disconnected;
                continue 'reconnect;
            }
        }

        // Pump until the connection drops or the client closes.
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    break 'reconnect;
                }
                queued = outgoing.recv() => {
                    let Some(event) = queued else { break 'reconnect };
                    if conn.send(&event).await.is_err() {
                        break;
                    }
                }
                received = conn.recv() => {
                    let Some(event) = received else { break };
                    route_event(&inner, event);
                }
            }
        }

        *inner.state.write() = ConnectionState::Disconnected;
        tracing::debug!("Connection lost, reconnecting");
    }

    // `close` wins over any state the dial path wrote concurrently.
    if *shutdown.borrow() {
        *inner.state.write() = ConnectionState::Closed;
    }
}

enum Handshake {
    Ready { user_id: i64, session_id: String },
    Rejected { retryable: bool, reason: String },
    Dropped,
}

async fn await_ready(conn: &mut dyn Connection) -> Handshake {
    loop {
        match conn.recv().await {
            Some(ServerEvent::Ready {
                user_id,
                session_id,
            }) => {
                return Handshake::Ready {
                    user_id,
                    session_id,
                }
            }
            Some(ServerEvent::Error {
                reason, retryable, ..
            }) => return Handshake::Rejected { retryable, reason },
            Some(_) => continue,
            None => return Handshake::Dropped,
        }
    }
}

/// Route one incoming event: resolve any pending ack, then fan out to
/// subscribers.
fn route_event(inner: &ClientInner, event: ServerEvent) {
    if let ServerEvent::SendAck {
        message_id,
        idempotency_key: Some(key),
    } = &event
    {
        if let Some(waiter) = inner.pending_acks.lock().remove(key) {
            let _ = waiter.send(*message_id);
        }
    }
    // No subscribers is fine.
    let _ = inner.events.send(event);
}

/// Sleep out the backoff (with jitter), unless shutdown lands first.
/// Returns the next backoff value.
async fn sleep_backoff(current: Duration, shutdown: &mut watch::Receiver<bool>) -> Duration {
    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
    tokio::select! {
        _ = tokio::time::sleep(current + jitter) => {}
        _ = shutdown.changed() => {}
    }
    (current * 2).min(MAX_BACKOFF)
}
