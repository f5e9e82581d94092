use crate::job::contract::LoginCredential;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling on parallel worker loops per loader.
pub const MAX_WORKER_INSTANCES: usize = 10;

const DEFAULT_POLL_BACKOFF_SECS: u64 = 10;
const DEFAULT_BUDGET_RETRY_DELAY_MS: u64 = 250;
const DEFAULT_HOST: &str = "127.0.0.1";

/// Runtime configuration for one crawl job.
///
/// All instances must be constructed via [`JobConfig::builder`] or
/// [`JobConfig::new`] so invariants are validated before any consumer
/// observes the values. The instance count is deliberately *not* validated:
/// the loader clamps it into `[1, MAX_WORKER_INSTANCES]`.
#[derive(Debug, Clone)]
pub struct JobConfig {
    name: String,
    instances: usize,
    size: i64,
    rate_limit: u32,
    bundle_mode: bool,
    debug: bool,
    starts: Vec<String>,
    login: Option<Vec<LoginCredential>>,
    host: String,
    port: u16,
    master: Option<String>,
    work_dir: PathBuf,
    poll_backoff: Duration,
    budget_retry_delay: Duration,
    metrics_interval: Duration,
}

pub struct JobConfigParams {
    pub name: String,
    pub instances: usize,
    pub size: i64,
    pub rate_limit: u32,
    pub bundle_mode: bool,
    pub debug: bool,
    pub starts: Vec<String>,
    pub login: Option<Vec<LoginCredential>>,
    pub host: String,
    pub port: u16,
    pub master: Option<String>,
    pub work_dir: PathBuf,
    pub poll_backoff: Duration,
    pub budget_retry_delay: Duration,
    pub metrics_interval: Duration,
}

impl JobConfig {
    /// Returns a builder to incrementally construct and validate a
    /// configuration.
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder::default()
    }

    pub fn new(params: JobConfigParams) -> Result<Self> {
        let JobConfigParams {
            name,
            instances,
            size,
            rate_limit,
            bundle_mode,
            debug,
            starts,
            login,
            host,
            port,
            master,
            work_dir,
            poll_backoff,
            budget_retry_delay,
            metrics_interval,
        } = params;

        let config = Self {
            name: name.trim().to_owned(),
            instances,
            size,
            rate_limit,
            bundle_mode,
            debug,
            starts,
            login,
            host: host.trim().to_owned(),
            port,
            master: master.map(|addr| addr.trim().to_owned()),
            work_dir,
            poll_backoff,
            budget_retry_delay,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Job name; also names the per-job working area on disk.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw instance count hint as configured.
    pub fn instances(&self) -> usize {
        self.instances
    }

    /// Worker count actually spawned: the hint clamped into
    /// `[1, MAX_WORKER_INSTANCES]`.
    pub fn effective_instances(&self) -> usize {
        self.instances.clamp(1, MAX_WORKER_INSTANCES)
    }

    /// Total-size limit; zero or negative disables size accounting.
    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn is_unbounded(&self) -> bool {
        self.size <= 0
    }

    /// Request-rate limit; zero means unlimited (no budget gating).
    pub fn rate_limit(&self) -> u32 {
        self.rate_limit
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limit > 0
    }

    /// Whether work items are bundle seeds rather than single URLs.
    pub fn is_bundle(&self) -> bool {
        self.bundle_mode
    }

    /// Debug mode turns per-item parse failures fatal.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Start URLs seeded into the queue in standalone mode.
    pub fn starts(&self) -> &[String] {
        &self.starts
    }

    /// Credential sets for the job's login procedure, when configured.
    pub fn login_credentials(&self) -> Option<&[LoginCredential]> {
        self.login.as_deref()
    }

    /// Host this worker's RPC endpoint binds and advertises.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port for the worker RPC endpoint; zero binds an ephemeral port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Master controller address, when attached.
    pub fn master(&self) -> Option<&str> {
        self.master.as_deref()
    }

    /// Root under which the per-job working area is created.
    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }

    /// Pause between polls when the queue comes back empty.
    pub fn poll_backoff(&self) -> Duration {
        self.poll_backoff
    }

    /// Pause between budget requests that come back with a zero grant.
    pub fn budget_retry_delay(&self) -> Duration {
        self.budget_retry_delay
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("job name cannot be empty");
        }

        if self.host.is_empty() {
            bail!("host cannot be empty");
        }

        if let Some(master) = &self.master {
            if master.is_empty() {
                bail!("master address cannot be empty when set");
            }
        }

        if self.poll_backoff.is_zero() {
            bail!("poll_backoff must be greater than 0");
        }

        if self.budget_retry_delay.is_zero() {
            bail!("budget_retry_delay must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct JobConfigBuilder {
    name: Option<String>,
    instances: Option<usize>,
    size: Option<i64>,
    rate_limit: Option<u32>,
    bundle_mode: Option<bool>,
    debug: Option<bool>,
    starts: Option<Vec<String>>,
    login: Option<Vec<LoginCredential>>,
    host: Option<String>,
    port: Option<u16>,
    master: Option<String>,
    work_dir: Option<PathBuf>,
    poll_backoff: Option<Duration>,
    budget_retry_delay: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl JobConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn instances(mut self, instances: usize) -> Self {
        self.instances = Some(instances);
        self
    }

    pub fn size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn bundle_mode(mut self, bundle_mode: bool) -> Self {
        self.bundle_mode = Some(bundle_mode);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn starts(mut self, starts: Vec<String>) -> Self {
        self.starts = Some(starts);
        self
    }

    pub fn login(mut self, credentials: Vec<LoginCredential>) -> Self {
        self.login = Some(credentials);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn master(mut self, master: impl Into<String>) -> Self {
        self.master = Some(master.into());
        self
    }

    pub fn work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn poll_backoff(mut self, backoff: Duration) -> Self {
        self.poll_backoff = Some(backoff);
        self
    }

    pub fn budget_retry_delay(mut self, delay: Duration) -> Self {
        self.budget_retry_delay = Some(delay);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<JobConfig> {
        let params = JobConfigParams {
            name: self.name.context("name is required")?,
            instances: self.instances.unwrap_or(1),
            size: self.size.unwrap_or(0),
            rate_limit: self.rate_limit.unwrap_or(0),
            bundle_mode: self.bundle_mode.unwrap_or(false),
            debug: self.debug.unwrap_or(false),
            starts: self.starts.unwrap_or_default(),
            login: self.login,
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: self.port.unwrap_or(0),
            master: self.master,
            work_dir: self
                .work_dir
                .unwrap_or_else(|| std::env::temp_dir().join("spiderling")),
            poll_backoff: self
                .poll_backoff
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_POLL_BACKOFF_SECS)),
            budget_retry_delay: self
                .budget_retry_delay
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_BUDGET_RETRY_DELAY_MS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        JobConfig::new(params)
    }
}
