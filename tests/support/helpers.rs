use anyhow::{bail, Result};
use spiderling::{NodeIdentity, QueueTopology, WorkQueue, WorkQueueOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

pub fn init_tracing() {
    spiderling::init_tracing();
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, what: &str, condition: F) -> Result<()>
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out after {timeout:?} waiting for {what}");
        }
        sleep(Duration::from_millis(5)).await;
    }
}

/// Opens a standalone work queue rooted at `dir` (no existence hook).
pub fn open_queue(dir: &Path) -> Arc<WorkQueue> {
    let local = NodeIdentity::new("127.0.0.1", 11300);
    Arc::new(
        WorkQueue::new(WorkQueueOptions {
            store_dir: dir.join("store"),
            backup_dir: dir.join("backup"),
            topology: QueueTopology {
                nodes: vec![local.clone()],
                local,
                copies: 1,
            },
            existence_hook: None,
        })
        .expect("work queue should open"),
    )
}
