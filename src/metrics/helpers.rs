//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BROADCASTS_TOTAL, CONNECTIONS_ACTIVE, CONNECTIONS_REGISTERED_TOTAL, CONNECTIONS_REMOVED_TOTAL,
    CONNECTION_DURATION, DELIVERIES_TOTAL, DUPLICATE_KEY_REJECTIONS_TOTAL,
    HEARTBEAT_DURATION_MS, HEARTBEAT_EVICTIONS_TOTAL, HEARTBEAT_PINGS_TOTAL,
    INBOUND_DROPPED_TOTAL, INBOUND_FRAMES_TOTAL, PROCESS_MEMORY_BYTES,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    /// Record a connection admitted to the hub
    pub fn record_registered() {
        CONNECTIONS_REGISTERED_TOTAL.inc();
        CONNECTIONS_ACTIVE.inc();
    }

    /// Record a connection removed from the hub
    pub fn record_removed(reason: &str) {
        CONNECTIONS_REMOVED_TOTAL.with_label_values(&[reason]).inc();
        CONNECTIONS_ACTIVE.dec();
    }

    pub fn record_duplicate_key() {
        DUPLICATE_KEY_REJECTIONS_TOTAL.inc();
    }

    /// Record how long a connection stayed open
    pub fn observe_duration(secs: f64) {
        CONNECTION_DURATION.observe(secs);
    }
}

/// Helper struct for delivery outcome metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record_delivered() {
        DELIVERIES_TOTAL.with_label_values(&["delivered"]).inc();
    }

    /// Record a failed send, labelled by error kind
    pub fn record_failed(kind: &str) {
        DELIVERIES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_broadcast() {
        BROADCASTS_TOTAL.inc();
    }
}

/// Helper struct for heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    /// Record heartbeat round duration
    pub fn record_duration_ms(duration_ms: u64) {
        HEARTBEAT_DURATION_MS.observe(duration_ms as f64);
    }

    pub fn record_pings(sent: u64, failed: u64) {
        HEARTBEAT_PINGS_TOTAL.with_label_values(&["sent"]).inc_by(sent);
        HEARTBEAT_PINGS_TOTAL.with_label_values(&["failed"]).inc_by(failed);
    }

    pub fn record_evictions(count: u64) {
        HEARTBEAT_EVICTIONS_TOTAL.inc_by(count);
    }
}

/// Helper struct for inbound frame metrics
pub struct InboundMetrics;

impl InboundMetrics {
    pub fn record_frame(kind: &str) {
        INBOUND_FRAMES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_dropped() {
        INBOUND_DROPPED_TOTAL.inc();
    }
}

/// Helper struct for memory metrics
pub struct MemoryMetrics;

impl MemoryMetrics {
    /// Update process memory metric (call periodically)
    pub fn update_process_memory() {
        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
                for line in status.lines() {
                    if line.starts_with("VmRSS:") {
                        if let Some(kb_str) = line.split_whitespace().nth(1) {
                            if let Ok(kb) = kb_str.parse::<i64>() {
                                PROCESS_MEMORY_BYTES.set(kb * 1024);
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}
