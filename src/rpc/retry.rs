//! Shared retry context and canned message templates used by the master
//! client so every coordination call logs breaker permits, retries, and
//! exhaustion the same way.

use crate::rpc::circuit_breaker::CircuitState;
use anyhow::Error;
use std::time::Duration;

/// Logging labels describing how one master operation reports its retry
/// lifecycle.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) permit: &'static str,
    pub(crate) circuit_open: &'static str,
    pub(crate) timeout: &'static str,
    pub(crate) retry: &'static str,
    pub(crate) exhausted: &'static str,
}

/// Context threaded through `retry_with_breaker` tying log lines to the
/// method being called.
#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    method: &'static str,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(method: &'static str, messages: &'a RetryMessages) -> Self {
        Self { method, messages }
    }

    pub(crate) fn method(&self) -> &'static str {
        self.method
    }

    pub(crate) fn log_permit(&self, state: CircuitState) {
        tracing::trace!(
            method = self.method,
            breaker_state = ?state,
            "{}",
            self.messages.permit
        );
    }

    pub(crate) fn log_circuit_open(&self) {
        tracing::warn!(method = self.method, "{}", self.messages.circuit_open);
    }

    pub(crate) fn log_timeout(&self, attempt: usize, backoff: Duration) {
        tracing::warn!(
            method = self.method,
            attempt,
            backoff_ms = duration_to_millis(backoff),
            "{}",
            self.messages.timeout
        );
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &Error) {
        tracing::warn!(
            method = self.method,
            attempt,
            backoff_ms = duration_to_millis(backoff),
            error = %err,
            "{}",
            self.messages.retry
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: usize, err: &Error) {
        tracing::error!(
            method = self.method,
            attempt,
            error = %err,
            "{}",
            self.messages.exhausted
        );
    }
}

fn duration_to_millis(backoff: Duration) -> u64 {
    backoff.as_millis().min(u128::from(u64::MAX)) as u64
}

pub(crate) const READY_RETRY: RetryMessages = RetryMessages {
    permit: "circuit breaker permit acquired for worker registration",
    circuit_open: "master circuit breaker open; rejecting ready call",
    timeout: "ready call timed out; will retry",
    retry: "ready call failed; retrying",
    exhausted: "ready call exhausted retries",
};

pub(crate) const GET_NODES_RETRY: RetryMessages = RetryMessages {
    permit: "circuit breaker permit acquired for topology fetch",
    circuit_open: "master circuit breaker open; rejecting get_nodes call",
    timeout: "get_nodes call timed out; will retry",
    retry: "get_nodes call failed; retrying",
    exhausted: "get_nodes call exhausted retries",
};

pub(crate) const COMPLETE_RETRY: RetryMessages = RetryMessages {
    permit: "circuit breaker permit acquired for completion report",
    circuit_open: "master circuit breaker open; rejecting complete call",
    timeout: "complete call timed out; will retry",
    retry: "complete call failed; retrying",
    exhausted: "complete call exhausted retries",
};

pub(crate) const REQUIRE_RETRY: RetryMessages = RetryMessages {
    permit: "circuit breaker permit acquired for budget request",
    circuit_open: "master circuit breaker open; rejecting require call",
    timeout: "require call timed out; will retry",
    retry: "require call failed; retrying",
    exhausted: "require call exhausted retries",
};
