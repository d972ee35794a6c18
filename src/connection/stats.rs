//! Per-connection delivery accounting

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone)]
struct FailureSnapshot {
    at: DateTime<Utc>,
    reason: String,
}

/// Delivery counters for a single connection.
///
/// Counters are plain atomics and the last-failure snapshot is swapped in
/// atomically, so recording never blocks. The snapshot is stored after the
/// failure counter is bumped, so a concurrent reader may briefly see a new
/// count next to the previous reason.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    total_sent: AtomicU64,
    total_failed: AtomicU64,
    last_failure: ArcSwapOption<FailureSnapshot>,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.total_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, reason: impl Into<String>) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
        self.last_failure.store(Some(Arc::new(FailureSnapshot {
            at: Utc::now(),
            reason: reason.into(),
        })));
    }

    pub fn total_sent(&self) -> u64 {
        self.total_sent.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed.load(Ordering::Relaxed)
    }

    /// Percentage of attempts that did not fail; 100 when nothing was attempted yet
    pub fn success_rate(&self) -> f64 {
        success_rate(self.total_sent(), self.total_failed())
    }

    /// Time and reason of the most recent failure, `(None, "")` if there was none
    pub fn last_failure(&self) -> (Option<DateTime<Utc>>, String) {
        match &*self.last_failure.load() {
            Some(snapshot) => (Some(snapshot.at), snapshot.reason.clone()),
            None => (None, String::new()),
        }
    }

    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        let total_sent = self.total_sent();
        let total_failed = self.total_failed();
        let (last_failure_at, reason) = self.last_failure();
        DeliveryStatsSnapshot {
            total_sent,
            total_failed,
            success_rate: success_rate(total_sent, total_failed),
            last_failure_at,
            last_failure_reason: last_failure_at.map(|_| reason),
        }
    }
}

fn success_rate(sent: u64, failed: u64) -> f64 {
    if sent == 0 {
        return 100.0;
    }
    ((sent as f64 - failed as f64) / sent as f64 * 100.0).max(0.0)
}

/// Point-in-time copy of [`DeliveryStats`]
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub total_sent: u64,
    pub total_failed: u64,
    pub success_rate: f64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_no_attempts_is_full_success() {
        let stats = DeliveryStats::new();
        assert_eq!(stats.success_rate(), 100.0);
        assert_eq!(stats.last_failure(), (None, String::new()));
    }

    #[test]
    fn test_success_rate_law() {
        for (sent, failed) in [(1u64, 0u64), (4, 1), (15, 3), (7, 7), (1000, 333)] {
            let stats = DeliveryStats::new();
            for _ in 0..sent {
                stats.record_sent();
            }
            for i in 0..failed {
                stats.record_failure(format!("failure {}", i));
            }
            let expected = (sent - failed) as f64 / sent as f64 * 100.0;
            assert!((stats.success_rate() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_failures_without_attempts_clamp_to_zero() {
        let stats = DeliveryStats::new();
        stats.record_sent();
        stats.record_failure("closed");
        stats.record_failure("closed");
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_last_failure_is_most_recent() {
        let stats = DeliveryStats::new();
        stats.record_failure("first");
        stats.record_failure("second");

        let (at, reason) = stats.last_failure();
        assert!(at.is_some());
        assert_eq!(reason, "second");
        assert_eq!(stats.total_failed(), 2);
    }

    #[test]
    fn test_snapshot_hides_reason_until_failure() {
        let stats = DeliveryStats::new();
        stats.record_sent();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_sent, 1);
        assert!(snapshot.last_failure_reason.is_none());

        stats.record_failure("write timed out");
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.last_failure_reason.as_deref(), Some("write timed out"));
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let stats = Arc::new(DeliveryStats::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_sent();
                        stats.record_failure("x");
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(stats.total_sent(), 8000);
        assert_eq!(stats.total_failed(), 8000);
    }

    #[test]
    fn test_concurrent_failures_keep_a_whole_snapshot() {
        let stats = Arc::new(DeliveryStats::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        stats.record_failure(format!("writer {} failure {}", w, i));
                    }
                })
            })
            .collect();

        for _ in 0..500 {
            let (at, reason) = stats.last_failure();
            assert_eq!(at.is_some(), !reason.is_empty());
        }
        for w in writers {
            w.join().unwrap();
        }

        let (_, reason) = stats.last_failure();
        assert!(reason.ends_with("failure 499"));
        assert_eq!(stats.total_failed(), 2000);
    }
}
