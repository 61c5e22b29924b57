//! Benchmark harness for approximate nearest-neighbor indexes.
//!
//! A run builds an index over a corpus while sampling the process's memory,
//! replays a query set against it, and reports recall@k and per-query
//! latency next to the construction cost.

pub mod cli;
pub mod config;
pub mod datasets;
pub mod driver;
pub mod evaluator;
pub mod report;
pub mod run;
pub mod sampler;
pub mod stats;
pub mod telemetry;

pub use run::{run_benchmark, BenchmarkRequest, RunError};
