//! Repository Implementations
//!
//! PostgreSQL implementations of the domain repository traits.

mod message_repository;
mod participant_repository;
mod push_target_repository;
mod retention_repository;

pub use message_repository::PgMessageRepository;
pub use participant_repository::{PgIdentityRepository, PgParticipantRepository};
pub use push_target_repository::PgPushTargetRepository;
pub use retention_repository::PgRetentionPolicyRepository;
