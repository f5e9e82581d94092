pub mod job;
pub mod loader;
pub mod queue;
pub mod rpc;
pub mod runtime;

pub use job::contract::{CrawlJob, JobFuture, LoginCredential};
pub use job::opener::{HttpOpener, Opener};
pub use job::patterns::UrlPatterns;
pub use job::work::{Bundle, ParseResult, Parser, WorkItem};
pub use loader::budget::{BudgetGate, BudgetThrottle, BUDGET_REQUEST_BATCH};
pub use loader::job_loader::{JobLoader, JobLoaderParams, LoaderError};
pub use queue::bloom::FileBloomFilter;
pub use queue::work_queue::{ExistenceHook, QueueTopology, WorkQueue, WorkQueueOptions};
pub use rpc::circuit_breaker::{CircuitBreakerSnapshot, CircuitState, MasterCircuitBreaker};
pub use rpc::endpoint::{RemoteCommand, WorkerEndpoint};
pub use rpc::node::NodeIdentity;
pub use rpc::{MasterClient, RpcClientOptions, RpcError};
pub use runtime::config::{JobConfig, JobConfigBuilder, JobConfigParams, MAX_WORKER_INSTANCES};
pub use runtime::fatal::FailureLedger;
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
