use crate::job::contract::CrawlJob;
use crate::job::work::WorkItem;
use crate::loader::job_loader::{JobLoader, JobLoaderParams};
use crate::queue::bloom::FileBloomFilter;
use crate::queue::work_queue::{QueueTopology, WorkQueue, WorkQueueOptions};
use crate::rpc::client::MasterClient;
use crate::rpc::endpoint::{command_channel, CommandReceiver, RemoteCommand, WorkerEndpoint};
use crate::rpc::node::NodeIdentity;
use crate::runtime::config::JobConfig;
use crate::runtime::telemetry::{self, init_tracing_to_file};
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Process-boundary orchestrator for one worker.
///
/// Prepares the per-job working area (queue store/backup directories, the
/// bloom-filter artifact, the log artifact), binds the worker RPC endpoint,
/// and wires the two execution shapes: standalone (seed the queue, run to
/// completion) and attached (register with the master, wait for the remote
/// `run`). OS signals are wired exactly once here, never inside the loader.
pub struct Runner {
    job: Arc<dyn CrawlJob>,
    config: JobConfig,
}

impl Runner {
    pub fn new<J: CrawlJob>(job: J, config: JobConfig) -> Self {
        Self::from_arc(Arc::new(job), config)
    }

    pub fn from_arc(job: Arc<dyn CrawlJob>, config: JobConfig) -> Self {
        Self { job, config }
    }

    /// Runs the job without signal handling; cancellation comes from the
    /// master (attached) or job completion (standalone).
    pub async fn run(self) -> Result<()> {
        self.execute(false).await
    }

    /// Runs the job and additionally treats Ctrl-C (SIGINT) as a stop
    /// request: in-flight items are requeued and collaborators released.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.execute(true).await
    }

    async fn execute(self, wire_signals: bool) -> Result<()> {
        let holder = self.prepare_working_area()?;
        init_tracing_to_file(&holder.join("job.log"))?;

        let master = self
            .config
            .master()
            .map(MasterClient::new)
            .transpose()?
            .map(Arc::new);

        let (commands_tx, commands_rx) = command_channel();
        let endpoint = WorkerEndpoint::bind(&self.config.bind_addr(), commands_tx).await?;
        let local = NodeIdentity::new(self.config.host(), endpoint.local_addr().port());

        let nodes = match &master {
            Some(master) => master
                .get_nodes()
                .await
                .context("failed to fetch node topology from master")?,
            None => vec![local.clone()],
        };
        let copies = if master.is_some() { 2 } else { 1 };

        let bloom = Arc::new(FileBloomFilter::open(
            holder.join("bloomfilter"),
            FileBloomFilter::capacity_for(self.config.size()),
        )?);
        let queue = Arc::new(WorkQueue::new(WorkQueueOptions {
            store_dir: holder.join("mq").join("store"),
            backup_dir: holder.join("mq").join("backup"),
            topology: QueueTopology {
                nodes,
                local: local.clone(),
                copies,
            },
            existence_hook: Some(bloom),
        })?);

        let loader = Arc::new(JobLoader::new(JobLoaderParams {
            job: self.job.clone(),
            config: self.config.clone(),
            queue: queue.clone(),
            master: master.clone(),
            shutdown: CancellationToken::new(),
        }));

        let reporter_token = CancellationToken::new();
        let reporter = telemetry::spawn_metrics_reporter(
            loader.telemetry(),
            queue.clone(),
            reporter_token.clone(),
            self.config.metrics_interval(),
        );

        let result = match &master {
            None => {
                self.run_standalone(loader.clone(), commands_rx, wire_signals)
                    .await
            }
            Some(master) => {
                self.run_attached(loader.clone(), master, &local, commands_rx, wire_signals)
                    .await
            }
        };

        reporter_token.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task panicked");
        }
        endpoint.shutdown().await;

        result
    }

    /// Masterless mode: seed the queue with the configured start URLs and
    /// run the worker pool to completion synchronously.
    async fn run_standalone(
        &self,
        loader: Arc<JobLoader>,
        commands: CommandReceiver,
        wire_signals: bool,
    ) -> Result<()> {
        let seeded = loader.queue().put(
            self.config
                .starts()
                .iter()
                .map(|start| WorkItem::new(start.clone())),
        )?;
        tracing::info!(seeded, "seeded queue with start urls");

        drive_run(loader, commands, wire_signals).await
    }

    /// Attached mode: register with the master and wait, without polling,
    /// for the remote `run` invocation (or a stop) before starting the pool.
    async fn run_attached(
        &self,
        loader: Arc<JobLoader>,
        master: &Arc<MasterClient>,
        local: &NodeIdentity,
        mut commands: CommandReceiver,
        wire_signals: bool,
    ) -> Result<()> {
        master
            .ready(local)
            .await
            .context("failed to register with master")?;
        tracing::info!(node = %local, master = master.endpoint(), "registered with master; awaiting remote run");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(RemoteCommand::Run) => break,
                    Some(RemoteCommand::Stop) => {
                        loader.stop().await?;
                        return Ok(());
                    }
                    None => bail!("worker endpoint command channel closed before run"),
                },
                _ = signal::ctrl_c(), if wire_signals => {
                    tracing::info!("interrupt received while awaiting remote run");
                    loader.stop().await?;
                    return Ok(());
                }
            }
        }

        drive_run(loader, commands, wire_signals).await
    }

    fn prepare_working_area(&self) -> Result<PathBuf> {
        let holder = self
            .config
            .work_dir()
            .join(self.config.name().replace(' ', "_"));
        for dir in [holder.join("mq").join("store"), holder.join("mq").join("backup")] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create working dir {}", dir.display()))?;
        }
        Ok(holder)
    }
}

/// Runs the loader as a task while keeping the command channel (and
/// optionally Ctrl-C) live, so a remote or local stop can interrupt an
/// in-progress run.
async fn drive_run(
    loader: Arc<JobLoader>,
    mut commands: CommandReceiver,
    wire_signals: bool,
) -> Result<()> {
    let run_loader = loader.clone();
    let mut run_task = tokio::spawn(async move { run_loader.run().await });
    let mut commands_open = true;

    loop {
        tokio::select! {
            joined = &mut run_task => {
                return match joined {
                    Ok(result) => result,
                    Err(err) => Err(anyhow!("loader task panicked: {err}")),
                };
            }
            command = commands.recv(), if commands_open => match command {
                Some(RemoteCommand::Stop) => loader.stop().await?,
                Some(RemoteCommand::Run) => {
                    tracing::debug!("ignoring duplicate remote run command");
                }
                None => commands_open = false,
            },
            _ = signal::ctrl_c(), if wire_signals => {
                tracing::info!("interrupt received; stopping worker pool");
                loader.stop().await?;
            }
        }
    }
}
