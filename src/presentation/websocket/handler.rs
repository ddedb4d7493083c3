//! WebSocket Connection Handler
//!
//! Drives one connection from handshake to close: authenticate, register with
//! the gateway, then loop over client events. Each event is dispatched through
//! an exhaustive match on the closed `ClientEvent` set.
//!
//! Ordering invariant for sends: members see `message_new` before the sender
//! sees `send_ack`, so an acknowledged message has already been fanned out.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use super::events::{ClientEvent, MessagePayload, ServerEvent};
use crate::application::{DeliveryError, SendRequest};
use crate::domain::ChannelRef;
use crate::shared::error::AuthError;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Credential passed at handshake time; clients may instead send an
    /// `auth` frame as their first event.
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

struct SessionContext {
    session_id: String,
    user_id: i64,
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, query_token: Option<String>) {
    let session_id = Uuid::new_v4().to_string();

    tracing::debug!(session_id = %session_id, "New WebSocket connection");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Writer task: everything the session is told goes through this channel.
    let writer_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Authenticate before anything else is processed. A query-string token
    // wins; otherwise the first frame must be an auth event.
    let auth_timeout = Duration::from_secs(state.settings.websocket.auth_timeout_secs);
    let token = match query_token {
        Some(token) => Some(token),
        None => match timeout(auth_timeout, first_auth_frame(&mut stream)).await {
            Ok(token) => token,
            Err(_) => {
                tracing::debug!(session_id = %session_id, "Authentication timeout");
                None
            }
        },
    };

    let user_id = match state.authenticator.authenticate(token.as_deref()).await {
        Ok(user_id) => user_id,
        Err(e) => {
            reject(&tx, &session_id, e).await;
            writer_task.abort();
            return;
        }
    };

    state
        .gateway
        .register_session(session_id.clone(), user_id, tx.clone());

    if tx
        .send(ServerEvent::Ready {
            user_id,
            session_id: session_id.clone(),
        })
        .is_err()
    {
        state.gateway.unregister_session(&session_id);
        writer_task.abort();
        return;
    }

    let ctx = SessionContext {
        session_id: session_id.clone(),
        user_id,
    };

    // Main event loop
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => process_event(&ctx, &state, event).await,
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "Unparseable client event");
                    let _ = tx.send(ServerEvent::Error {
                        code: "bad_event".into(),
                        reason: "unparseable event".into(),
                        retryable: false,
                    });
                }
            },
            Ok(WsMessage::Close(_)) => {
                tracing::debug!(session_id = %session_id, "Connection closed");
                break;
            }
            Ok(WsMessage::Ping(_)) => {
                // Pong is handled automatically by axum
            }
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Cleanup: the gateway emits member_left to each joined channel.
    state.gateway.unregister_session(&session_id);
    writer_task.abort();

    tracing::info!(
        user_id = user_id,
        session_id = %session_id,
        "User disconnected"
    );
}

/// Read frames until the first auth event, a close, or an error.
async fn first_auth_frame(
    stream: &mut (impl Stream<Item = Result<WsMessage, axum::Error>> + Unpin),
) -> Option<String> {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                if let Ok(ClientEvent::Auth { token }) = serde_json::from_str::<ClientEvent>(&text)
                {
                    return Some(token);
                }
                // Anything else before auth is a protocol violation.
                return None;
            }
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Tell the client why it was rejected, then give the writer a moment to
/// flush before teardown.
async fn reject(tx: &mpsc::UnboundedSender<ServerEvent>, session_id: &str, error: AuthError) {
    tracing::debug!(session_id = %session_id, error = %error, "Authentication failed");
    let _ = tx.send(ServerEvent::Error {
        code: error.reason().into(),
        reason: error.to_string(),
        retryable: error.is_retryable(),
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Dispatch one client event.
async fn process_event(ctx: &SessionContext, state: &AppState, event: ClientEvent) {
    match event {
        // A second auth frame on an established session is ignored.
        ClientEvent::Auth { .. } => {}

        ClientEvent::Join { channel } => handle_join(ctx, state, channel).await,

        ClientEvent::Leave { channel } => {
            state.gateway.leave(&ctx.session_id, channel);
        }

        ClientEvent::Send {
            channel,
            content,
            source_lang,
            idempotency_key,
        } => {
            handle_send(
                ctx,
                state,
                channel,
                SendRequest {
                    content,
                    source_lang,
                    idempotency_key,
                },
            )
            .await
        }

        ClientEvent::TypingStart { channel } => {
            if state.gateway.is_joined(&ctx.session_id, channel) {
                state.gateway.broadcast_except(
                    channel,
                    &ctx.session_id,
                    ServerEvent::TypingStart {
                        channel,
                        user_id: ctx.user_id,
                    },
                );
            }
        }

        ClientEvent::TypingStop { channel } => {
            if state.gateway.is_joined(&ctx.session_id, channel) {
                state.gateway.broadcast_except(
                    channel,
                    &ctx.session_id,
                    ServerEvent::TypingStop {
                        channel,
                        user_id: ctx.user_id,
                    },
                );
            }
        }

        ClientEvent::MarkRead {
            channel,
            message_id,
        } => {
            if let Err(e) = state
                .delivery
                .mark_read(channel, ctx.user_id, message_id, Utc::now())
                .await
            {
                send_delivery_error(ctx, state, &e);
            }
        }

        ClientEvent::Delete {
            channel,
            message_id,
        } => {
            match state
                .delivery
                .delete_message(channel, ctx.user_id, message_id)
                .await
            {
                Ok(()) => {
                    state.gateway.broadcast(
                        channel,
                        ServerEvent::MessageDeleted {
                            channel,
                            message_id,
                        },
                    );
                }
                Err(e) => send_delivery_error(ctx, state, &e),
            }
        }
    }
}

async fn handle_join(ctx: &SessionContext, state: &AppState, channel: ChannelRef) {
    // Authorization comes from persisted participation, not from connecting.
    let authorized = match state.participants.is_participant(channel, ctx.user_id).await {
        Ok(authorized) => authorized,
        Err(e) => {
            tracing::error!(user_id = ctx.user_id, channel = %channel, error = %e, "Participant check failed");
            state.gateway.send_to_session(
                &ctx.session_id,
                ServerEvent::Error {
                    code: "internal".into(),
                    reason: "join failed".into(),
                    retryable: true,
                },
            );
            return;
        }
    };

    if !authorized {
        state.gateway.send_to_session(
            &ctx.session_id,
            ServerEvent::Error {
                code: "forbidden".into(),
                reason: "not a participant of this channel".into(),
                retryable: false,
            },
        );
        return;
    }

    state.gateway.join(&ctx.session_id, channel);
}

async fn handle_send(
    ctx: &SessionContext,
    state: &AppState,
    channel: ChannelRef,
    request: SendRequest,
) {
    if !state.gateway.is_joined(&ctx.session_id, channel) {
        send_delivery_error(ctx, state, &DeliveryError::Forbidden);
        return;
    }

    let idempotency_key = request.idempotency_key.clone();
    let outcome = match state.delivery.send(channel, ctx.user_id, request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            send_delivery_error(ctx, state, &e);
            return;
        }
    };

    // A deduplicated send is replayed in full: the retry usually means the
    // original fan-out was lost with the connection or process that produced
    // it. Recipients dedup by message id.
    state.gateway.broadcast(
        channel,
        ServerEvent::MessageNew {
            message: MessagePayload::from(&outcome.message),
        },
    );

    // Ack strictly after broadcast, echoing the key so the client can release
    // the matching pending attempt.
    state.gateway.send_to_session(
        &ctx.session_id,
        ServerEvent::SendAck {
            message_id: outcome.message.id,
            idempotency_key,
        },
    );

    spawn_offline_fallback(state, ctx.user_id, outcome.message);
}

/// Fan out the offline push fallback without holding up the event loop.
fn spawn_offline_fallback(state: &AppState, sender_id: i64, message: crate::domain::Message) {
    let participants = Arc::clone(&state.participants);
    let gateway = Arc::clone(&state.gateway);
    let push = Arc::clone(&state.push);
    let channel = message.channel;

    tokio::spawn(async move {
        let members = match participants.participants(channel).await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Participant lookup failed for push fallback");
                return;
            }
        };

        // Presence is sampled at broadcast time; a participant connecting a
        // moment later may receive both the live event and a push.
        let offline: Vec<i64> = members
            .iter()
            .map(|p| p.user_id)
            .filter(|&id| id != sender_id && !gateway.is_user_online(id))
            .collect();

        push.notify_offline(&offline, &message).await;
    });
}

fn send_delivery_error(ctx: &SessionContext, state: &AppState, error: &DeliveryError) {
    let (code, retryable) = match error {
        DeliveryError::NotFound => ("not_found", false),
        DeliveryError::Forbidden => ("forbidden", false),
        DeliveryError::ContentTooLong => ("content_too_long", false),
        DeliveryError::Internal(_) => ("internal", true),
    };
    if matches!(error, DeliveryError::Internal(_)) {
        tracing::error!(user_id = ctx.user_id, error = %error, "Delivery error");
    }
    state.gateway.send_to_session(
        &ctx.session_id,
        ServerEvent::Error {
            code: code.into(),
            reason: error.to_string(),
            retryable,
        },
    );
}
