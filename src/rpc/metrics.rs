//! Counters for the master client: per-method call volumes, failure and
//! timeout totals, and the running sum of granted budget tokens. Exposed as
//! an aggregated snapshot so callers never see the raw atomics.

use crate::rpc::circuit_breaker::CircuitState;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct RpcMetrics {
    require_calls: AtomicU64,
    complete_calls: AtomicU64,
    ready_calls: AtomicU64,
    get_nodes_calls: AtomicU64,
    total_errors: AtomicU64,
    total_timeouts: AtomicU64,
    tokens_granted: AtomicU64,
}

impl RpcMetrics {
    pub(crate) fn record_call(&self, method: &str) {
        let counter = match method {
            "require" => &self.require_calls,
            "complete" => &self.complete_calls,
            "ready" => &self.ready_calls,
            "get_nodes" => &self.get_nodes_calls,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        self.total_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_tokens_granted(&self, granted: u32) {
        if granted == 0 {
            return;
        }
        self.tokens_granted
            .fetch_add(u64::from(granted), Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RpcMetricsSnapshot {
        RpcMetricsSnapshot {
            require_calls: self.require_calls.load(Ordering::Relaxed),
            complete_calls: self.complete_calls.load(Ordering::Relaxed),
            ready_calls: self.ready_calls.load(Ordering::Relaxed),
            get_nodes_calls: self.get_nodes_calls.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
            tokens_granted: self.tokens_granted.load(Ordering::Relaxed),
            breaker_state: CircuitState::Closed,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct RpcMetricsSnapshot {
    pub require_calls: u64,
    pub complete_calls: u64,
    pub ready_calls: u64,
    pub get_nodes_calls: u64,
    pub total_errors: u64,
    pub total_timeouts: u64,
    pub tokens_granted: u64,
    pub breaker_state: CircuitState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_calls_per_method() {
        let metrics = RpcMetrics::default();
        metrics.record_call("require");
        metrics.record_call("require");
        metrics.record_call("complete");
        metrics.record_call("unknown");
        metrics.record_tokens_granted(10);
        metrics.record_tokens_granted(0);
        metrics.record_timeout();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.require_calls, 2);
        assert_eq!(snapshot.complete_calls, 1);
        assert_eq!(snapshot.ready_calls, 0);
        assert_eq!(snapshot.tokens_granted, 10);
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.total_timeouts, 1);
    }
}
