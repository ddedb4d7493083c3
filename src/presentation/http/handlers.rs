//! HTTP Handlers
//!
//! The HTTP surface is small: health, and catch-up reads of individual
//! messages for clients that missed the live broadcast. Reads double as read
//! receipts, which is what starts the clock for on-read retention.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::DeliveryError;
use crate::domain::{ChannelKind, ChannelRef};
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Basic health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Basic health check
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub struct FetchMessageQuery {
    /// The reader's language; room messages are translated on demand.
    pub lang: String,
}

/// One message resolved for the requesting reader.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub channel: ChannelRef,
    pub sender_id: i64,
    /// The text in the reader's language (original or translation).
    pub text: String,
    pub source_lang: String,
    pub created_at: DateTime<Utc>,
}

/// GET /api/v1/channels/{kind}/{id}/messages/{message_id}
///
/// Fetching a message counts as reading it: for on-read retention this is
/// where the expiry clock starts.
pub async fn fetch_message(
    State(state): State<AppState>,
    Path((kind, channel_id, message_id)): Path<(String, i64, i64)>,
    Query(query): Query<FetchMessageQuery>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let token = bearer_token(&headers);
    let user_id = state.authenticator.authenticate(token).await?;

    let kind = ChannelKind::from_str(&kind)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown channel kind: {kind}")))?;
    let channel = ChannelRef { kind, id: channel_id };

    if !state.participants.is_participant(channel, user_id).await? {
        return Err(AppError::Forbidden(
            "not a participant of this channel".into(),
        ));
    }

    let fetched = state
        .delivery
        .fetch_for_reader(channel, message_id, &query.lang)
        .await
        .map_err(delivery_to_app)?;

    let read_at = Utc::now();
    if let Err(e) = state
        .delivery
        .mark_read(channel, user_id, message_id, read_at)
        .await
    {
        // The read itself succeeded; a failed receipt only delays expiry.
        tracing::warn!(message_id = message_id, error = %e, "Read receipt failed");
    }

    Ok(Json(MessageResponse {
        id: fetched.message.id,
        channel: fetched.message.channel,
        sender_id: fetched.message.sender_id,
        text: fetched.text,
        source_lang: fetched.message.source_lang,
        created_at: fetched.message.created_at,
    }))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn delivery_to_app(error: DeliveryError) -> AppError {
    match error {
        DeliveryError::NotFound => AppError::NotFound("message not found".into()),
        DeliveryError::Forbidden => AppError::Forbidden("not allowed".into()),
        DeliveryError::ContentTooLong => AppError::BadRequest("message too long".into()),
        DeliveryError::Internal(msg) => AppError::Internal(msg),
    }
}
