use crate::job::work::WorkItem;
use std::sync::Mutex;

/// Per-worker registry of checked-out work.
///
/// One slot per worker id, so `stop()` can requeue every outstanding item
/// rather than a single loader-wide reference.
pub(crate) struct InFlightSlots {
    slots: Mutex<Vec<Option<WorkItem>>>,
}

impl InFlightSlots {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; workers]),
        }
    }

    pub(crate) fn set(&self, worker_id: usize, item: WorkItem) {
        let mut slots = self.slots.lock().expect("in-flight slots mutex poisoned");
        if let Some(slot) = slots.get_mut(worker_id) {
            *slot = Some(item);
        }
    }

    pub(crate) fn clear(&self, worker_id: usize) {
        let mut slots = self.slots.lock().expect("in-flight slots mutex poisoned");
        if let Some(slot) = slots.get_mut(worker_id) {
            *slot = None;
        }
    }

    pub(crate) fn take(&self, worker_id: usize) -> Option<WorkItem> {
        let mut slots = self.slots.lock().expect("in-flight slots mutex poisoned");
        slots.get_mut(worker_id).and_then(Option::take)
    }

    /// Empties every slot, returning the outstanding items in worker order.
    pub(crate) fn drain(&self) -> Vec<WorkItem> {
        let mut slots = self.slots.lock().expect("in-flight slots mutex poisoned");
        slots.iter_mut().filter_map(Option::take).collect()
    }
}
