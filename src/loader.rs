//! The worker orchestration core: the job loader, its worker pool and
//! execution unit, the budget throttle, the completion accountant, and the
//! per-worker in-flight registry.

pub mod accountant;
pub mod budget;
pub mod job_loader;
pub mod pool;
pub mod slots;
pub mod worker;
