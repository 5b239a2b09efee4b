//! Benchmark coordinator
//!
//! Spawns one worker per connection, waits for all of them and merges their
//! stats into the final report.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::stats::HistogramStat;
use super::worker::run_connection;
use crate::client::ClientFactory;
use crate::errors::{QuickError, Result};
use crate::request::RequestFactory;
use crate::utils::format_duration;

/// Benchmark configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchConfig {
    pub duration: Duration,
    pub connections: usize,
    pub requests_per_connection: usize,
}

impl BenchConfig {
    /// Benchmark mode is on only when every knob is positive
    pub fn is_enabled(&self) -> bool {
        !self.duration.is_zero() && self.connections > 0 && self.requests_per_connection > 0
    }
}

/// Run the benchmark and print its report to `out`
///
/// Returns the merged stats. A request that cannot be built stops every
/// worker and is returned as an error, with no report printed.
pub async fn run_benchmark<F: ClientFactory>(
    config: BenchConfig,
    factory: &F,
    requests: Arc<RequestFactory>,
    cancel: CancellationToken,
    out: &mut dyn Write,
) -> Result<HistogramStat> {
    writeln!(out, "Running {} test @ {}", format_duration(config.duration), requests.url())?;
    writeln!(
        out,
        "  {} connections and {} requests per connection",
        config.connections, config.requests_per_connection
    )?;

    let clients = (0..config.connections)
        .map(|_| factory.create().map(Arc::new))
        .collect::<Result<Vec<_>>>()?;

    // fatal errors stop the siblings without touching the caller's token
    let stop = cancel.child_token();
    let mut workers = JoinSet::new();
    let start = Instant::now();
    for client in clients {
        workers.spawn(run_connection(client, requests.clone(), config, stop.clone()));
    }
    info!(connections = config.connections, "benchmark started");

    let mut shards = Vec::with_capacity(config.connections);
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(stat)) => shards.push(stat),
            Ok(Err(e)) => {
                stop.cancel();
                return Err(e);
            }
            Err(e) => {
                stop.cancel();
                return Err(QuickError::Worker(e.to_string()));
            }
        }
    }
    let wall_time = start.elapsed();
    debug!(?wall_time, shards = shards.len(), "all workers finished");

    let mut total = HistogramStat::new(config.duration)?;
    for shard in &shards {
        total.merge(shard);
    }
    total.report(out, wall_time)?;

    Ok(total)
}
