//! Data ingestion layer for sensor-trace.
//!
//! Discovers and reads line-oriented sensor logs, runs the header phase to
//! build a sensor registry, and demultiplexes body lines into per-sensor
//! time-series records.

pub mod ingest;
pub mod parser;
pub mod reader;
pub mod registry;

pub use trace_core as core;
