//! Runtime glue: validated job configuration, the pool failure ledger,
//! telemetry, and the process-boundary runner that wires standalone and
//! master-attached execution.

pub mod config;
pub mod fatal;
pub mod runner;
pub mod telemetry;
