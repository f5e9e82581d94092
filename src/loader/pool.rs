use crate::loader::worker::{Worker, WorkerShared};
use crate::runtime::fatal::FailureLedger;
use anyhow::anyhow;
use futures::FutureExt;
use std::any::Any;
use tokio::task::JoinHandle;

/// Spawns the worker loops for one loader run.
///
/// Each worker is fenced with `catch_unwind`: a failing or panicking worker
/// terminates only itself. The failure lands in the ledger, the worker's
/// checked-out item goes back to the queue, and the siblings keep running
/// until the pool-wide join surfaces the aggregate.
pub(crate) fn launch_workers(
    shared: WorkerShared,
    instances: usize,
    ledger: FailureLedger,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(instances);

    for worker_id in 0..instances {
        let worker = Worker::new(worker_id, shared.clone());
        let ledger = ledger.clone();
        let queue = shared.queue.clone();
        let slots = shared.slots.clone();
        let telemetry = shared.telemetry.clone();

        let handle = tokio::spawn(async move {
            let result = std::panic::AssertUnwindSafe(worker.run()).catch_unwind().await;

            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.context(format!("worker {worker_id} exited with error"))),
                Err(panic_payload) => {
                    let panic_msg = panic_message(panic_payload.as_ref());
                    Some(anyhow!("worker {worker_id} panicked: {panic_msg}"))
                }
            };

            let Some(err) = failure else {
                return;
            };
            ledger.record(worker_id, err);

            // The failed worker never reached its completion path; put its
            // checked-out item back so the work is not lost.
            if let Some(item) = slots.take(worker_id) {
                telemetry.record_item_requeued();
                if let Err(requeue_err) = queue.requeue(item) {
                    tracing::warn!(
                        worker = worker_id,
                        error = %requeue_err,
                        "failed to requeue item from failed worker"
                    );
                }
            }
        });

        handles.push(handle);
    }

    handles
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
