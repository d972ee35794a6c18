//! Prometheus metrics for the event delivery hub.
//!
//! This module provides metrics for monitoring the hub:
//! - Connection metrics (active connections, admissions, removals by reason)
//! - Delivery metrics (outcomes of every send attempt)
//! - Heartbeat metrics (round duration, pings, evictions)
//! - Inbound frame metrics

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, DeliveryMetrics, HeartbeatMetrics, InboundMetrics,
    MemoryMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "livewire";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of connections currently registered in the hub
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of connections currently registered"
    ).unwrap();

    /// Connections admitted to the hub
    pub static ref CONNECTIONS_REGISTERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_registered_total", METRIC_PREFIX),
        "Total connections admitted to the hub"
    ).unwrap();

    /// Connections removed from the hub, by reason
    pub static ref CONNECTIONS_REMOVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_removed_total", METRIC_PREFIX),
        "Total connections removed from the hub",
        &["reason"]
    ).unwrap();

    /// Admissions refused because the key was taken
    pub static ref DUPLICATE_KEY_REJECTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_duplicate_key_rejections_total", METRIC_PREFIX),
        "Total admissions rejected because the client key was already registered"
    ).unwrap();

    /// Connection lifetime
    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Connection lifetime in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Send attempts by outcome
    pub static ref DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Total send attempts by outcome",
        &["outcome"]
    ).unwrap();

    /// Broadcast fan-outs started
    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcast fan-outs"
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    /// Heartbeat round duration
    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Duration of a heartbeat round in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    ).unwrap();

    /// Pings by result
    pub static ref HEARTBEAT_PINGS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_heartbeat_pings_total", METRIC_PREFIX),
        "Total heartbeat pings by result",
        &["result"]
    ).unwrap();

    /// Connections evicted for missing the liveness window
    pub static ref HEARTBEAT_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_evictions_total", METRIC_PREFIX),
        "Total connections evicted by the heartbeat supervisor"
    ).unwrap();

    // ============================================================================
    // Inbound Metrics
    // ============================================================================

    /// Frames received from clients, by kind
    pub static ref INBOUND_FRAMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_inbound_frames_total", METRIC_PREFIX),
        "Total frames received from clients",
        &["kind"]
    ).unwrap();

    /// Application frames dropped because no consumer could take them
    pub static ref INBOUND_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_inbound_dropped_total", METRIC_PREFIX),
        "Total inbound application frames dropped"
    ).unwrap();

    // ============================================================================
    // Process Metrics
    // ============================================================================

    /// Resident memory of the process
    pub static ref PROCESS_MEMORY_BYTES: IntGauge = register_int_gauge!(
        format!("{}_process_memory_bytes", METRIC_PREFIX),
        "Resident memory of the process in bytes"
    ).unwrap();
}
