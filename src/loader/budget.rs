use crate::rpc::client::MasterClient;
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Tokens requested from the master per replenishment call. Batching trades
/// RPC frequency for burstiness: one remote round-trip buys ten fetches.
pub const BUDGET_REQUEST_BATCH: u32 = 10;

/// Outcome of a budget gate: either a token was obtained (or no gating
/// applies) and the fetch may proceed, or the stop flag fired while waiting
/// and the caller should wind down without fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetGate {
    Granted,
    Stopped,
}

/// Local token cache over the master's `require` protocol.
///
/// The token count lives under an async mutex and the whole
/// check-decrement-or-refill sequence runs with the lock held, so concurrent
/// workers can never drive the counter negative and only one of them refills
/// at a time; the rest find a positive counter once the lock frees up.
pub struct BudgetThrottle {
    master: Option<Arc<MasterClient>>,
    rate_limited: bool,
    tokens: Mutex<u32>,
    retry_delay: Duration,
    stop: CancellationToken,
    telemetry: Arc<Telemetry>,
}

impl BudgetThrottle {
    pub fn new(
        master: Option<Arc<MasterClient>>,
        rate_limit: u32,
        retry_delay: Duration,
        stop: CancellationToken,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            master,
            rate_limited: rate_limit > 0,
            tokens: Mutex::new(0),
            retry_delay,
            stop,
            telemetry,
        }
    }

    /// Obtains permission for one rate-limited fetch.
    ///
    /// No-op without a master or without a rate limit. Otherwise the cheap
    /// path decrements the local counter; an empty counter blocks on batched
    /// `require` calls until the master grants tokens or the stop flag fires.
    pub async fn acquire(&self) -> Result<BudgetGate> {
        let Some(master) = &self.master else {
            return Ok(BudgetGate::Granted);
        };
        if !self.rate_limited {
            return Ok(BudgetGate::Granted);
        }

        let mut tokens = self.tokens.lock().await;
        if *tokens > 0 {
            *tokens -= 1;
            return Ok(BudgetGate::Granted);
        }

        loop {
            if self.stop.is_cancelled() {
                return Ok(BudgetGate::Stopped);
            }

            let granted = tokio::select! {
                granted = master.require(BUDGET_REQUEST_BATCH) => granted?,
                _ = self.stop.cancelled() => return Ok(BudgetGate::Stopped),
            };

            if granted > 0 {
                tracing::debug!(granted, "budget batch granted");
                self.telemetry.record_budget_refill();
                *tokens = granted - 1;
                return Ok(BudgetGate::Granted);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = self.stop.cancelled() => return Ok(BudgetGate::Stopped),
            }
        }
    }

    /// Tokens currently cached locally.
    pub async fn available(&self) -> u32 {
        *self.tokens.lock().await
    }

    #[cfg(test)]
    pub(crate) async fn preload(&self, tokens: u32) {
        *self.tokens.lock().await = tokens;
    }
}
