//! # Chat Relay Library
//!
//! This crate provides the real-time message delivery subsystem of a
//! translation-enabled chat application:
//! - WebSocket gateway for live message fan-out, presence, and typing
//! - Idempotent, at-least-once message persistence (PostgreSQL)
//! - Eager conversation translation and cached on-demand room translation
//! - Offline push fallback for participants without a live session
//! - Retention sweeper for timed and on-read message expiry
//! - An embeddable client core with reconnect and send-retry machinery
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Core business entities and repository traits
//! - **Application Layer**: Delivery, push fallback, and retention services
//! - **Infrastructure Layer**: Database, cache, and collaborator HTTP clients
//! - **Presentation Layer**: HTTP routes and the WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! chat_relay/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities, value objects, and traits
//! +-- application/    Delivery engine, push fallback, retention sweeper
//! +-- infrastructure/ Database, cache, translation and push clients
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- client/         Embeddable client core (reconnect, send retry)
//! +-- shared/         Common utilities (errors, snowflake IDs)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Embeddable client core
pub mod client;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
