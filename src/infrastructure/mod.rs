//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Database repositories (PostgreSQL)
//! - Translation cache (Redis)
//! - Translation service and push gateway HTTP clients
//! - Prometheus metrics

pub mod cache;
pub mod database;
pub mod metrics;
pub mod push;
pub mod repositories;
pub mod translation;
