use crate::job::work::WorkItem;
use crate::queue::store::NodeStore;
use crate::rpc::node::NodeIdentity;
use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Existence check consulted before a new item is admitted into the queue.
/// `check_and_record` returns `true` when the key has been seen before and
/// records it otherwise; `persist` is invoked on queue shutdown.
pub trait ExistenceHook: Send + Sync {
    fn check_and_record(&self, key: &str) -> bool;

    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Node layout of the distributed queue this client participates in. The
/// replication/consistency algorithm itself lives on the other side of the
/// queue boundary; this client records the topology and keeps the local
/// store and backup nodes.
#[derive(Debug, Clone)]
pub struct QueueTopology {
    pub nodes: Vec<NodeIdentity>,
    pub local: NodeIdentity,
    pub copies: usize,
}

pub struct WorkQueueOptions {
    pub store_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub topology: QueueTopology,
    pub existence_hook: Option<Arc<dyn ExistenceHook>>,
}

/// Local client of the distributed work queue.
///
/// `put` admits new items through the existence hook (deduplication),
/// `get` is a non-blocking poll, and `shutdown` spills whatever is still
/// pending to the store node so no admitted work is lost across restarts.
/// `requeue` re-admits an item that was already checked out once and must
/// therefore bypass the existence hook.
pub struct WorkQueue {
    pending: Mutex<VecDeque<WorkItem>>,
    hook: Option<Arc<dyn ExistenceHook>>,
    store: NodeStore,
    backup: NodeStore,
    topology: QueueTopology,
    closed: AtomicBool,
}

impl WorkQueue {
    pub fn new(options: WorkQueueOptions) -> Result<Self> {
        let store = NodeStore::open(&options.store_dir)?;
        let backup = NodeStore::open(&options.backup_dir)?;
        let recovered = store.take_pending()?;
        if !recovered.is_empty() {
            tracing::info!(
                items = recovered.len(),
                "recovered pending work from previous shutdown"
            );
        }

        Ok(Self {
            pending: Mutex::new(recovered.into()),
            hook: options.existence_hook,
            store,
            backup,
            topology: options.topology,
            closed: AtomicBool::new(false),
        })
    }

    pub fn topology(&self) -> &QueueTopology {
        &self.topology
    }

    /// Admits new items, skipping any the existence hook has seen before.
    /// Returns the number actually admitted.
    pub fn put<I>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = WorkItem>,
    {
        if self.closed.load(Ordering::SeqCst) {
            bail!("work queue is shut down");
        }

        let mut admitted = 0usize;
        let mut pending = self.pending.lock().expect("work queue mutex poisoned");
        for item in items {
            if let Some(hook) = &self.hook {
                if hook.check_and_record(item.as_str()) {
                    tracing::trace!(item = %item, "skipping already-seen work item");
                    continue;
                }
            }
            if self.topology.copies >= 2 {
                self.backup.append(&item)?;
            }
            pending.push_back(item);
            admitted += 1;
        }
        Ok(admitted)
    }

    /// Re-admits an item that was checked out and must not be lost. Bypasses
    /// the existence hook: a requeued item has necessarily been seen.
    pub fn requeue(&self, item: WorkItem) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("work queue is shut down");
        }
        tracing::debug!(item = %item, "requeueing in-flight work item");
        self.pending
            .lock()
            .expect("work queue mutex poisoned")
            .push_front(item);
        Ok(())
    }

    /// Non-blocking poll; `None` when the queue is empty or shut down.
    pub fn get(&self) -> Option<WorkItem> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.pending
            .lock()
            .expect("work queue mutex poisoned")
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .expect("work queue mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current pending items, front first.
    pub fn snapshot(&self) -> Vec<WorkItem> {
        self.pending
            .lock()
            .expect("work queue mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Flushes pending items to the store node, persists the existence hook,
    /// and closes the client. Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let drained: Vec<WorkItem> = {
            let mut pending = self.pending.lock().expect("work queue mutex poisoned");
            pending.drain(..).collect()
        };
        self.store.flush_pending(&drained)?;
        if let Some(hook) = &self.hook {
            hook.persist()?;
        }
        tracing::info!(spilled = drained.len(), "work queue shut down");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
