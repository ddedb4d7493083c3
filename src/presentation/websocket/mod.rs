//! WebSocket Gateway
//!
//! Real-time message delivery over WebSocket connections.

pub mod auth;
pub mod events;
pub mod gateway;
pub mod handler;

pub use auth::SessionAuthenticator;
pub use events::{ClientEvent, MessagePayload, ServerEvent};
pub use gateway::Gateway;
pub use handler::ws_handler;
