//! Runtime orchestration layer for sensor-trace.
//!
//! Runs parse jobs across many files and statistics jobs across many
//! channels on tokio's blocking pool.

pub mod batch;
pub mod stats_job;

pub use trace_core as core;
pub use trace_data as data;
