//! Application Layer
//!
//! Business logic services: the message delivery engine, the offline push
//! fallback, and the retention sweeper. This layer orchestrates the flow of
//! data between the presentation and domain layers.

pub mod delivery;
pub mod push;
pub mod retention;

pub use delivery::{DeliveryError, DeliveryService, FetchedMessage, SendOutcome, SendRequest};
pub use push::OfflinePushService;
pub use retention::{DeletionNotifier, NoopDeletionNotifier, RetentionSweeper, SweepStats};
