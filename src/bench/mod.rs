//! Benchmarking module for load testing
//!
//! `--bm-conn` connections each keep `--bm-req-per-conn` requests in flight
//! for `--bm-duration`, then the per-connection stats are merged into one
//! wrk-style report.

pub mod cycle;
pub mod runner;
pub mod stats;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use runner::{run_benchmark, BenchConfig};
pub use stats::{HistogramStat, RequestOutcome};
