//! Engine-wide counters, updated lock-free and read as a snapshot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_operations: u64,
    /// Transformations actually performed, not merely checked.
    pub conflicts_resolved: u64,
    pub average_latency_ms: f64,
    pub active_sessions: u64,
    pub active_users: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    total_operations: AtomicU64,
    conflicts_resolved: AtomicU64,
    total_latency_micros: AtomicU64,
    active_sessions: AtomicU64,
    active_users: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_micros.fetch_add(micros, Ordering::Relaxed);
        self.total_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict_resolved(&self) {
        self.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        saturating_sub(&self.active_sessions, 1);
    }

    pub fn users_joined(&self, n: u64) {
        self.active_users.fetch_add(n, Ordering::Relaxed);
    }

    pub fn users_left(&self, n: u64) {
        saturating_sub(&self.active_users, n);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_operations = self.total_operations.load(Ordering::Relaxed);
        let total_latency = self.total_latency_micros.load(Ordering::Relaxed);
        let average_latency_ms = if total_operations == 0 {
            0.0
        } else {
            total_latency as f64 / total_operations as f64 / 1000.0
        };
        MetricsSnapshot {
            total_operations,
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Relaxed),
            average_latency_ms,
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            active_users: self.active_users.load(Ordering::Relaxed),
        }
    }
}

fn saturating_sub(counter: &AtomicU64, n: u64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(n)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn test_running_mean_latency() {
        let m = Metrics::new();
        m.record_operation(Duration::from_millis(2));
        m.record_operation(Duration::from_millis(4));
        let s = m.snapshot();
        assert_eq!(s.total_operations, 2);
        assert!((s.average_latency_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_gauges_never_underflow() {
        let m = Metrics::new();
        m.session_opened();
        m.users_joined(2);
        m.users_left(5);
        m.session_closed();
        m.session_closed();
        let s = m.snapshot();
        assert_eq!(s.active_users, 0);
        assert_eq!(s.active_sessions, 0);
    }

    #[test]
    fn test_conflicts_counted() {
        let m = Metrics::new();
        m.record_conflict_resolved();
        m.record_conflict_resolved();
        assert_eq!(m.snapshot().conflicts_resolved, 2);
    }
}
