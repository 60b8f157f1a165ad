//! Core types for sensor-trace.
//!
//! Error types, the per-sensor [`models::TimeSeriesRecord`], compiled field
//! schemas and their presets, the windowed statistics engine and the
//! command-line settings shared by the other crates.

pub mod error;
pub mod models;
pub mod schema;
pub mod settings;
pub mod stats;
