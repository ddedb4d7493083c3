//! # Domain Entities
//!
//! Core domain entities of the message delivery subsystem.
//!
//! ## Core Entities
//!
//! - **Message**: a persisted chat message with translation and retention state
//! - **ChannelRef**: a broadcast scope (direct conversation or group room)
//! - **RetentionPolicy**: when a message's content becomes inaccessible
//! - **PushTarget**: a registered push notification address for a user
//! - **Participant**: persisted, authorization-grade channel membership
//!
//! ## Repository Traits
//!
//! Each entity has an associated repository trait defining data access
//! operations. These traits are implemented in the infrastructure layer,
//! following the dependency inversion principle.

mod channel;
mod message;
mod participant;
mod push_target;
mod retention;

pub use channel::{ChannelKind, ChannelRef};
pub use message::{Message, MessageRepository};
pub use participant::{IdentityRepository, Participant, ParticipantRepository};
pub use push_target::{PushTarget, PushTargetRepository};
pub use retention::{RetentionPolicy, RetentionPolicyRepository};
