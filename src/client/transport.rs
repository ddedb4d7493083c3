//! Client Transport
//!
//! Abstraction over the wire so the connection manager and send state machine
//! are testable against an in-process fake. The real transport speaks
//! WebSocket via tungstenite, presenting the credential as a query parameter.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::presentation::websocket::{ClientEvent, ServerEvent};

/// Transport-level errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("connection closed")]
    Closed,
}

/// One established connection.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError>;

    /// Next server event. `None` means the connection is gone; unparseable
    /// frames are skipped.
    async fn recv(&mut self) -> Option<ServerEvent>;
}

/// Dials connections; called once per (re)connect attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, token: &str) -> Result<Box<dyn Connection>, TransportError>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket transport against a relay server.
pub struct WsTransport {
    /// Base websocket URL, e.g. `wss://relay.example.com/ws`.
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, token: &str) -> Result<Box<dyn Connection>, TransportError> {
        let url = format!("{}?token={}", self.url, token);
        let (stream, _) = connect_async(&url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (sink, source) = stream.split();
        Ok(Box::new(WsConnection { sink, source }))
    }
}

struct WsConnection {
    sink: WsSink,
    source: WsSource,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let text = serde_json::to_string(event).map_err(|e| TransportError::Send(e.to_string()))?;
        self.sink
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ServerEvent> {
        while let Some(msg) = self.source.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => return Some(event),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping unparseable server event");
                        continue;
                    }
                },
                Ok(WsMessage::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    }
}
