//! Client Core
//!
//! Embeddable client for the relay: a managed connection with automatic
//! reconnect and re-join, a retrying send state machine keyed by idempotency
//! key, and typing indicator bookkeeping. UI layers subscribe to the typed
//! event stream and never see the socket.

pub mod connection;
pub mod sender;
pub mod transport;
pub mod typing;

pub use connection::{ChatClient, ClientError, ConnectionState, CredentialSource, StaticCredential};
pub use sender::{PendingSend, SendFailure, SendOutcome, SendState, ACK_TIMEOUT, MAX_ATTEMPTS};
pub use transport::{Connection, Transport, TransportError, WsTransport};
pub use typing::{TypingTracker, TYPING_EXPIRY};
