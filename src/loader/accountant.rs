use crate::job::work::WorkItem;
use crate::loader::slots::InFlightSlots;
use crate::rpc::client::MasterClient;
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tracks remaining work and decides termination.
///
/// With a master attached, the stop decision is delegated wholesale to the
/// remote `complete` call; the master is authoritative for global completion
/// across all workers. Standalone, the accountant counts the job's remaining
/// size down locally and raises the stop flag at zero. A non-positive size
/// limit disables size accounting entirely.
pub(crate) struct CompletionAccountant {
    size_limit: i64,
    remaining: AtomicI64,
    master: Option<Arc<MasterClient>>,
    slots: Arc<InFlightSlots>,
    stop: CancellationToken,
    telemetry: Arc<Telemetry>,
}

impl CompletionAccountant {
    pub(crate) fn new(
        size_limit: i64,
        master: Option<Arc<MasterClient>>,
        slots: Arc<InFlightSlots>,
        stop: CancellationToken,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            size_limit,
            remaining: AtomicI64::new(size_limit),
            master,
            slots,
            stop,
            telemetry,
        }
    }

    /// Registers a finished item and returns whether the calling worker
    /// should stop.
    pub(crate) async fn complete(&self, worker_id: usize, item: &WorkItem) -> Result<bool> {
        tracing::info!(worker = worker_id, item = %item, "work item completed");
        self.telemetry.record_item_completed();

        if self.size_limit <= 0 {
            return Ok(false);
        }

        self.slots.clear(worker_id);

        if let Some(master) = &self.master {
            return master.complete(item).await;
        }

        let remaining = self.remaining.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining <= 0 {
            tracing::info!(size = self.size_limit, "size limit reached; raising stop flag");
            self.stop.cancel();
        }
        Ok(self.stop.is_cancelled())
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::SeqCst)
    }
}
