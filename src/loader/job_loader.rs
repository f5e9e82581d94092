use crate::job::contract::CrawlJob;
use crate::loader::accountant::CompletionAccountant;
use crate::loader::budget::BudgetThrottle;
use crate::loader::pool;
use crate::loader::slots::InFlightSlots;
use crate::loader::worker::WorkerShared;
use crate::queue::work_queue::WorkQueue;
use crate::rpc::client::MasterClient;
use crate::runtime::config::JobConfig;
use crate::runtime::fatal::FailureLedger;
use crate::runtime::telemetry::Telemetry;
use anyhow::{bail, Context, Result};
use futures::future::join_all;
use rand::seq::IndexedRandom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Typed loader failures surfaced before any worker starts.
#[derive(Debug)]
pub enum LoaderError {
    Configuration(String),
}

impl std::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderError::Configuration(message) => write!(f, "configuration error: {message}"),
        }
    }
}

impl std::error::Error for LoaderError {}

pub struct JobLoaderParams {
    pub job: Arc<dyn CrawlJob>,
    pub config: JobConfig,
    pub queue: Arc<WorkQueue>,
    pub master: Option<Arc<MasterClient>>,
    pub shutdown: CancellationToken,
}

/// Top-level orchestrator for one crawl job: owns the configuration
/// snapshot, the queue client, the budget throttle, the completion
/// accountant, and the worker pool.
///
/// All state is interior-mutable so `run` and `stop` take `&self`; the stop
/// path is reachable from the RPC dispatch context and the process signal
/// handler while a run is in flight.
pub struct JobLoader {
    job: Arc<dyn CrawlJob>,
    config: JobConfig,
    queue: Arc<WorkQueue>,
    budget: Arc<BudgetThrottle>,
    accountant: Arc<CompletionAccountant>,
    slots: Arc<InFlightSlots>,
    stop: CancellationToken,
    telemetry: Arc<Telemetry>,
    ledger: FailureLedger,
    instances: usize,
    running: AtomicBool,
    stopping: AtomicBool,
}

impl JobLoader {
    pub fn new(params: JobLoaderParams) -> Self {
        let JobLoaderParams {
            job,
            config,
            queue,
            master,
            shutdown,
        } = params;

        let instances = config.effective_instances();
        let telemetry = Arc::new(Telemetry::default());
        let slots = Arc::new(InFlightSlots::new(instances));
        let budget = Arc::new(BudgetThrottle::new(
            master.clone(),
            config.rate_limit(),
            config.budget_retry_delay(),
            shutdown.clone(),
            telemetry.clone(),
        ));
        let accountant = Arc::new(CompletionAccountant::new(
            config.size(),
            master,
            slots.clone(),
            shutdown.clone(),
            telemetry.clone(),
        ));

        Self {
            job,
            config,
            queue,
            budget,
            accountant,
            slots,
            stop: shutdown,
            telemetry,
            ledger: FailureLedger::new(),
            instances,
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    /// Worker loops this loader spawns: the configured hint clamped into
    /// `[1, MAX_WORKER_INSTANCES]`.
    pub fn instances(&self) -> usize {
        self.instances
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        self.queue.clone()
    }

    pub fn budget(&self) -> Arc<BudgetThrottle> {
        self.budget.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Runs the worker pool to completion.
    ///
    /// Performs the login gate first, then spawns the workers and joins them
    /// all. The queue client is released on every exit path; aggregate
    /// worker failures recorded in the ledger become this method's error.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            bail!("job loader already running");
        }

        let result = self.run_inner().await;

        if let Err(err) = self.queue.shutdown() {
            tracing::warn!(error = %err, "failed to release queue client after run");
        }
        self.running.store(false, Ordering::SeqCst);

        result
    }

    async fn run_inner(&self) -> Result<()> {
        self.login_gate().await?;

        tracing::info!(
            job = self.config.name(),
            instances = self.instances,
            bundle_mode = self.config.is_bundle(),
            "starting worker pool"
        );

        let shared = WorkerShared {
            job: self.job.clone(),
            queue: self.queue.clone(),
            budget: self.budget.clone(),
            accountant: self.accountant.clone(),
            slots: self.slots.clone(),
            stop: self.stop.clone(),
            telemetry: self.telemetry.clone(),
            poll_backoff: self.config.poll_backoff(),
            bundle_mode: self.config.is_bundle(),
            debug: self.config.debug(),
        };

        let handles = pool::launch_workers(shared, self.instances, self.ledger.clone());
        let joined = join_all(handles).await;
        for (worker_id, join_result) in joined.into_iter().enumerate() {
            if let Err(err) = join_result {
                tracing::warn!(worker = worker_id, error = %err, "worker task join failed");
            }
        }

        if let Some(err) = self.ledger.error() {
            let failures = self.ledger.failure_count();
            return Err(err).with_context(|| {
                format!("worker pool finished with {failures} failed worker(s)")
            });
        }

        tracing::info!(
            completed = self.telemetry.items_completed(),
            "worker pool finished"
        );
        Ok(())
    }

    /// Validates the login preconditions and performs the login procedure
    /// with a uniformly random credential set.
    async fn login_gate(&self) -> Result<()> {
        if !self.job.requires_login() {
            return Ok(());
        }

        let credentials = self.config.login_credentials().unwrap_or_default();
        let Some(credential) = credentials.choose(&mut rand::rng()) else {
            return Err(LoaderError::Configuration(
                "job has a login procedure but the configuration carries no credential list"
                    .to_owned(),
            )
            .into());
        };

        self.job
            .login(credential)
            .await
            .context("login procedure failed")
    }

    /// Idempotent halt: raises the stop flag, requeues every checked-out
    /// item, and releases the queue client. Safe to call from any task.
    pub async fn stop(&self) -> Result<()> {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!("stop requested; halting worker pool");
        self.stop.cancel();

        for item in self.slots.drain() {
            self.telemetry.record_item_requeued();
            if let Err(err) = self.queue.requeue(item) {
                tracing::warn!(error = %err, "failed to requeue in-flight work item");
            }
        }

        self.queue.shutdown()
    }
}
