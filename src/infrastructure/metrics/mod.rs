//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active WebSocket session gauge
//! - Messages delivered / deduplicated counters
//! - Push dispatch outcomes by result
//! - Retention sweep deletions by channel kind

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active WebSocket sessions gauge
pub static SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("sessions_active", "Number of live authenticated sessions")
            .namespace("chat_relay"),
    )
    .expect("Failed to create SESSIONS_ACTIVE metric")
});

/// Message delivery counter - "created" vs "deduplicated" sends
pub static MESSAGES_DELIVERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("messages_delivered_total", "Total message sends processed")
            .namespace("chat_relay"),
        &["result"], // "created", "deduplicated"
    )
    .expect("Failed to create MESSAGES_DELIVERED_TOTAL metric")
});

/// Push dispatch counter by outcome
pub static PUSH_DISPATCH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("push_dispatch_total", "Push notification dispatch outcomes")
            .namespace("chat_relay"),
        &["outcome"], // "delivered", "failed", "invalid"
    )
    .expect("Failed to create PUSH_DISPATCH_TOTAL metric")
});

/// Retention sweep deletion counter by channel kind
pub static SWEEP_DELETED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sweep_deleted_total",
            "Messages soft-deleted by the retention sweeper",
        )
        .namespace("chat_relay"),
        &["channel_kind"],
    )
    .expect("Failed to create SWEEP_DELETED_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(SESSIONS_ACTIVE.clone()))
        .expect("Failed to register SESSIONS_ACTIVE");
    registry
        .register(Box::new(MESSAGES_DELIVERED_TOTAL.clone()))
        .expect("Failed to register MESSAGES_DELIVERED_TOTAL");
    registry
        .register(Box::new(PUSH_DISPATCH_TOTAL.clone()))
        .expect("Failed to register PUSH_DISPATCH_TOTAL");
    registry
        .register(Box::new(SWEEP_DELETED_TOTAL.clone()))
        .expect("Failed to register SWEEP_DELETED_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}
