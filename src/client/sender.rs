//! Send Retry State Machine
//!
//! One logical send walks an explicit state machine: each attempt waits a
//! bounded time for the server's ack, retries with backoff, and carries the
//! same idempotency key throughout so retries can never create a second
//! message. Cancellation is a first-class transition, valid from any
//! non-terminal state.

use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use super::connection::{ChatClient, ClientError};
use crate::domain::ChannelRef;
use crate::presentation::websocket::ClientEvent;

/// How long one attempt waits for the server's ack.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Attempts per logical send, the first one included.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff schedule between attempts, indexed by how many already failed.
const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(2),
];

/// States of one logical send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Sending { attempt: u32 },
    AwaitingAck { attempt: u32 },
    RetryWait { attempt: u32 },
    Acked { message_id: i64 },
    Failed(SendFailure),
    Cancelled,
}

/// Terminal failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// All attempts timed out waiting for an ack.
    Timeout,
    /// No live connection; the send never went on the wire.
    Disconnected,
    /// The client was closed for good.
    Closed,
}

/// How one logical send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Acked { message_id: i64 },
    Failed(SendFailure),
    Cancelled,
}

/// Caller-held cancellation switch for an in-flight send.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

pub(crate) struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    async fn cancelled(&mut self) {
        // Already-cancelled resolves immediately; a closed handle means the
        // caller can no longer cancel.
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// One logical send with retries.
pub struct PendingSend {
    client: ChatClient,
    channel: ChannelRef,
    content: String,
    source_lang: Option<String>,
    /// Fixed for the lifetime of the logical send; every retry carries it.
    idempotency_key: String,
    state: SendState,
    cancel: CancelToken,
}

impl PendingSend {
    /// Prepare a send. Nothing goes on the wire until `run`.
    pub fn new(
        client: ChatClient,
        channel: ChannelRef,
        content: String,
        source_lang: Option<String>,
    ) -> (Self, CancelHandle) {
        let (handle, token) = cancel_pair();
        (
            Self {
                client,
                channel,
                content,
                source_lang,
                idempotency_key: Uuid::new_v4().to_string(),
                state: SendState::Idle,
                cancel: token,
            },
            handle,
        )
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn state(&self) -> &SendState {
        &self.state
    }

    /// Drive the state machine to a terminal state.
    pub async fn run(self) -> SendOutcome {
        let PendingSend {
            client,
            channel,
            content,
            source_lang,
            idempotency_key,
            state: _,
            mut cancel,
        } = self;

        let mut state = SendState::Idle;
        let mut transition = |state: &mut SendState, next: SendState| {
            tracing::trace!(key = %idempotency_key, from = ?state, to = ?next, "Send transition");
            *state = next;
        };

        let cancelled = |client: &ChatClient, state: &mut SendState| {
            client.discard_ack(&idempotency_key);
            *state = SendState::Cancelled;
            SendOutcome::Cancelled
        };

        for attempt in 1..=MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return cancelled(&client, &mut state);
            }

            transition(&mut state, SendState::Sending { attempt });

            let ack = client.register_ack(idempotency_key.clone());
            let event = ClientEvent::Send {
                channel,
                content: content.clone(),
                source_lang: source_lang.clone(),
                idempotency_key: Some(idempotency_key.clone()),
            };

            match client.try_send(event) {
                Ok(()) => {
                    transition(&mut state, SendState::AwaitingAck { attempt });

                    tokio::select! {
                        acked = ack => {
                            if let Ok(message_id) = acked {
                                transition(&mut state, SendState::Acked { message_id });
                                return SendOutcome::Acked { message_id };
                            }
                            // Waiter dropped by a reconnect; retry.
                        }
                        _ = tokio::time::sleep(ACK_TIMEOUT) => {
                            tracing::debug!(key = %idempotency_key, attempt = attempt, "Ack timeout");
                            client.discard_ack(&idempotency_key);
                        }
                        _ = cancel.cancelled() => {
                            return cancelled(&client, &mut state);
                        }
                    }
                }
                Err(ClientError::Closed) => {
                    client.discard_ack(&idempotency_key);
                    transition(&mut state, SendState::Failed(SendFailure::Closed));
                    return SendOutcome::Failed(SendFailure::Closed);
                }
                Err(_) => {
                    // No connection: fail locally instead of queueing across
                    // a reconnect. The caller decides whether to re-issue the
                    // send (with the same key) once the client is ready.
                    client.discard_ack(&idempotency_key);
                    transition(&mut state, SendState::Failed(SendFailure::Disconnected));
                    return SendOutcome::Failed(SendFailure::Disconnected);
                }
            }

            if attempt < MAX_ATTEMPTS {
                transition(&mut state, SendState::RetryWait { attempt });
                let backoff = RETRY_BACKOFF[(attempt - 1) as usize];
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => {
                        return cancelled(&client, &mut state);
                    }
                }
            }
        }

        transition(&mut state, SendState::Failed(SendFailure::Timeout));
        SendOutcome::Failed(SendFailure::Timeout)
    }
}
