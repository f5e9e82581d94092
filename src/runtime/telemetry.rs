use crate::queue::work_queue::WorkQueue;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls
/// back to `info`. Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Installs a tracing subscriber writing to the job's log artifact instead
/// of stderr. Falls back to a no-op if a subscriber is already active.
pub fn init_tracing_to_file(path: &Path) -> Result<()> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .try_init();

    let _ = TRACING_INIT.set(());
    Ok(())
}

/// Rolling counters describing one loader's progress.
#[derive(Default, Debug)]
pub struct Telemetry {
    items_completed: AtomicU64,
    parse_errors: AtomicU64,
    urls_discovered: AtomicU64,
    seeds_discovered: AtomicU64,
    items_requeued: AtomicU64,
    budget_refills: AtomicU64,
    empty_polls: AtomicU64,
}

impl Telemetry {
    pub fn record_item_completed(&self) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discovered(&self, urls: usize, seeds: usize) {
        if urls > 0 {
            self.urls_discovered
                .fetch_add(urls as u64, Ordering::Relaxed);
        }
        if seeds > 0 {
            self.seeds_discovered
                .fetch_add(seeds as u64, Ordering::Relaxed);
        }
    }

    pub fn record_item_requeued(&self) {
        self.items_requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_budget_refill(&self) {
        self.budget_refills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn items_completed(&self) -> u64 {
        self.items_completed.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn budget_refills(&self) -> u64 {
        self.budget_refills.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            items_completed: self.items_completed.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            urls_discovered: self.urls_discovered.load(Ordering::Relaxed),
            seeds_discovered: self.seeds_discovered.load(Ordering::Relaxed),
            items_requeued: self.items_requeued.load(Ordering::Relaxed),
            budget_refills: self.budget_refills.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub items_completed: u64,
    pub parse_errors: u64,
    pub urls_discovered: u64,
    pub seeds_discovered: u64,
    pub items_requeued: u64,
    pub budget_refills: u64,
    pub empty_polls: u64,
}

/// Spawns a background task that periodically logs throughput, queue depth,
/// and error counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    queue: Arc<WorkQueue>,
    shutdown: tokio_util::sync::CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "spiderling::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let completed_delta = current_snapshot
                        .items_completed
                        .saturating_sub(last_snapshot.items_completed);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        completed_delta as f64 / elapsed
                    };
                    let queue_pending = queue.len();

                    tracing::info!(
                        target: "spiderling::metrics",
                        throughput = format!("{throughput:.2}"),
                        completed = current_snapshot.items_completed,
                        queue_pending,
                        parse_errors = current_snapshot.parse_errors,
                        urls_discovered = current_snapshot.urls_discovered,
                        budget_refills = current_snapshot.budget_refills,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
