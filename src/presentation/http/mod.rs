//! HTTP Surface
//!
//! Health, metrics, and catch-up message reads.

pub mod handlers;
pub mod routes;

pub use routes::create_router;
