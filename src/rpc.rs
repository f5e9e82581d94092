//! JSON-RPC plumbing for master coordination: the outbound master client
//! (circuit breaker, retry policy, metrics) and the worker-exposed endpoint
//! serving the remote `run`/`stop` lifecycle calls.

pub mod circuit_breaker;
pub mod client;
pub mod endpoint;
pub mod metrics;
pub mod node;
pub mod options;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreakerError, CircuitBreakerSnapshot, CircuitState, MasterCircuitBreaker,
};
pub use client::{MasterClient, RpcError};
pub use endpoint::{RemoteCommand, WorkerEndpoint};
pub use metrics::RpcMetricsSnapshot;
pub use node::NodeIdentity;
pub use options::RpcClientOptions;
