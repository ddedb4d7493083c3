//! Domain service traits for external collaborators.
//!
//! The delivery core treats translation and push delivery as opaque services:
//! it only depends on these contracts, never on a concrete provider.

mod push;
mod translation;

pub use push::{PushGateway, PushNotification, PushOutcome};
pub use translation::{TranslationCache, TranslationClient};
