//! Local face of the distributed work queue: the client contract the loader
//! drives (`put`/`get`/`shutdown` plus requeue), the bloom-filter existence
//! hook used for deduplication, and the on-disk spill store behind both.

pub mod bloom;
pub mod store;
pub mod work_queue;
