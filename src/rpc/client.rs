//! Outbound JSON-RPC client for the master controller. Wraps every
//! coordination call (`ready`, `get_nodes`, `complete`, `require`) in the
//! shared breaker-gated retry loop so transient master unavailability is
//! absorbed by backoff instead of blocking a worker forever.

use crate::job::work::WorkItem;
use crate::rpc::circuit_breaker::{CircuitBreakerError, MasterCircuitBreaker};
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::node::NodeIdentity;
use crate::rpc::options::RpcClientOptions;
use crate::rpc::retry::{
    RetryContext, COMPLETE_RETRY, GET_NODES_RETRY, READY_RETRY, REQUIRE_RETRY,
};
use anyhow::{anyhow, Result};
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[derive(Debug)]
pub enum RpcError {
    Timeout { method: &'static str },
    CircuitOpen,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "master {method} call timed out"),
            RpcError::CircuitOpen => write!(f, "master circuit breaker is open"),
        }
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Clone)]
pub struct MasterClient {
    master_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
    breaker: Arc<MasterCircuitBreaker>,
}

impl MasterClient {
    /// Builds a client for a master address given as `host:port` or a full
    /// `http(s)://` URL.
    pub fn new(master: &str) -> Result<Self> {
        Self::with_options(master, RpcClientOptions::default())
    }

    pub fn with_options(master: &str, options: RpcClientOptions) -> Result<Self> {
        Self::with_options_and_breaker(master, options, Arc::new(MasterCircuitBreaker::default()))
    }

    pub fn with_options_and_breaker(
        master: &str,
        options: RpcClientOptions,
        breaker: Arc<MasterCircuitBreaker>,
    ) -> Result<Self> {
        options.validate()?;

        let master_url = normalize_master_url(master);
        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .build(&master_url)
            .map_err(|err| anyhow!("failed to build master RPC client: {err}"))?;

        Ok(Self {
            master_url: Arc::new(master_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
            breaker,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.master_url
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.breaker_state = self.breaker.snapshot().state;
        snapshot
    }

    /// Registers this worker as ready to receive the remote `run` call.
    pub async fn ready(&self, node: &NodeIdentity) -> Result<bool> {
        let node = node.clone();
        self.retry_with_breaker(RetryContext::new("ready", &READY_RETRY), || {
            let node = node.clone();
            async move { self.request_once("ready", rpc_params![node]).await }
        })
        .await
    }

    /// Fetches the current node list for queue topology.
    pub async fn get_nodes(&self) -> Result<Vec<NodeIdentity>> {
        self.retry_with_breaker(RetryContext::new("get_nodes", &GET_NODES_RETRY), || async {
            self.request_once("get_nodes", rpc_params![]).await
        })
        .await
    }

    /// Reports a completed item; the master's answer is the authoritative
    /// stop decision for this worker.
    pub async fn complete(&self, item: &WorkItem) -> Result<bool> {
        let item = item.clone();
        self.retry_with_breaker(RetryContext::new("complete", &COMPLETE_RETRY), || {
            let item = item.clone();
            async move { self.request_once("complete", rpc_params![item]).await }
        })
        .await
    }

    /// Requests up to `tokens` budget tokens; the master grants between 0
    /// and `tokens`.
    pub async fn require(&self, tokens: u32) -> Result<u32> {
        let granted: u32 = self
            .retry_with_breaker(RetryContext::new("require", &REQUIRE_RETRY), || async {
                self.request_once("require", rpc_params![tokens]).await
            })
            .await?;

        // Defend the grant contract even against a misbehaving master.
        let granted = granted.min(tokens);
        self.metrics.record_tokens_granted(granted);
        Ok(granted)
    }

    /// Shared retry loop wrapping master calls with breaker gating, metrics,
    /// exponential backoff, and consistent logging.
    async fn retry_with_breaker<T, F, Fut>(
        &self,
        context: RetryContext<'_>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match self.breaker.before_request() {
                Ok(state) => context.log_permit(state),
                Err(CircuitBreakerError::CircuitOpen) => {
                    context.log_circuit_open();
                    return Err(RpcError::CircuitOpen.into());
                }
            }

            attempt += 1;
            self.metrics.record_call(context.method());

            match operation().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    let timed_out = matches!(
                        err.downcast_ref::<RpcError>(),
                        Some(RpcError::Timeout { .. })
                    );
                    if timed_out {
                        self.metrics.record_timeout();
                    } else {
                        self.metrics.record_error();
                    }
                    self.breaker.record_failure();

                    if attempt >= self.options.max_attempts {
                        context.log_exhausted(attempt, &err);
                        return Err(err);
                    }

                    let backoff = self.backoff_delay(attempt);
                    if timed_out {
                        context.log_timeout(attempt, backoff);
                    } else {
                        context.log_retry(attempt, backoff, &err);
                    }
                    sleep(backoff).await;
                }
            }
        }
    }

    async fn request_once<R>(&self, method: &'static str, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        timeout(
            self.options.request_timeout,
            self.client.request::<R, _>(method, params),
        )
        .await
        .map_err(|_| RpcError::Timeout { method })?
        .map_err(|err| map_client_error(method, err))
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return self.options.initial_backoff;
        }

        let exponent = attempt.saturating_sub(1) as u32;
        let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        let delay = self.options.initial_backoff.saturating_mul(multiplier);
        delay.min(self.options.max_backoff)
    }
}

fn map_client_error(method: &'static str, err: JsonRpcError) -> anyhow::Error {
    anyhow!("master {method} call failed: {err}")
}

fn normalize_master_url(master: &str) -> String {
    let master = master.trim();
    if master.starts_with("http://") || master.starts_with("https://") {
        master.to_owned()
    } else {
        format!("http://{master}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::retry::{RetryContext, GET_NODES_RETRY, REQUIRE_RETRY};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_client(breaker: Arc<MasterCircuitBreaker>) -> MasterClient {
        let options = RpcClientOptions {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            request_timeout: Duration::from_millis(5),
        };
        MasterClient::with_options_and_breaker("127.0.0.1:11200", options, breaker)
            .expect("test client must build")
    }

    #[test]
    fn bare_addresses_gain_a_scheme() {
        assert_eq!(normalize_master_url("10.0.0.1:11200"), "http://10.0.0.1:11200");
        assert_eq!(
            normalize_master_url("https://master.test:9000"),
            "https://master.test:9000"
        );
    }

    #[tokio::test]
    async fn retry_with_breaker_retries_timeouts() {
        let breaker = Arc::new(MasterCircuitBreaker::new(5, Duration::from_secs(5), 1));
        let client = test_client(breaker);
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_for_op = attempts.clone();

        let granted = client
            .retry_with_breaker(RetryContext::new("require", &REQUIRE_RETRY), move || {
                let attempts_for_future = attempts_for_op.clone();
                async move {
                    let current = attempts_for_future.fetch_add(1, Ordering::SeqCst);
                    if current == 0 {
                        Err(RpcError::Timeout { method: "require" }.into())
                    } else {
                        Ok(10u32)
                    }
                }
            })
            .await
            .expect("second attempt should succeed");

        assert_eq!(granted, 10);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(client.metrics().total_timeouts, 1);
    }

    #[tokio::test]
    async fn retry_with_breaker_respects_open_breaker() {
        let breaker = Arc::new(MasterCircuitBreaker::new(1, Duration::from_secs(60), 1));
        let client = test_client(breaker.clone());

        breaker.before_request().unwrap();
        breaker.record_failure();

        let executions = Arc::new(AtomicUsize::new(0));
        let executions_for_op = executions.clone();

        let err = client
            .retry_with_breaker(RetryContext::new("get_nodes", &GET_NODES_RETRY), move || {
                let executions_for_future = executions_for_op.clone();
                async move {
                    executions_for_future.fetch_add(1, Ordering::SeqCst);
                    Ok(Vec::<NodeIdentity>::new())
                }
            })
            .await
            .expect_err("breaker is open and should prevent calls");

        assert_eq!(executions.load(Ordering::SeqCst), 0);
        assert!(matches!(
            err.downcast_ref::<RpcError>(),
            Some(RpcError::CircuitOpen)
        ));
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let breaker = Arc::new(MasterCircuitBreaker::new(100, Duration::from_secs(5), 1));
        let client = test_client(breaker);
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_for_op = attempts.clone();

        let err = client
            .retry_with_breaker(RetryContext::new("require", &REQUIRE_RETRY), move || {
                let attempts_for_future = attempts_for_op.clone();
                async move {
                    attempts_for_future.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(anyhow!("master unavailable"))
                }
            })
            .await
            .expect_err("all attempts fail");

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(format!("{err}").contains("master unavailable"));
    }
}
