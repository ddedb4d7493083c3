//! HTTP Middleware
//!
//! Cross-cutting request layers: CORS and request tracing.

pub mod cors;
pub mod logging;

pub use cors::create_cors_layer;
pub use logging::create_trace_layer;
