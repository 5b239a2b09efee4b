//! Closed-loop request slots over one connection
//!
//! Each worker owns one client and keeps `requests_per_connection` attempts in
//! flight. A slot relaunches as soon as its attempt completes, until the
//! deadline sets the draining flag. Outcomes flow through a bounded channel to
//! a single aggregation loop that owns the [`HistogramStat`].
//!
//! On the deadline, in-flight attempts are awaited and counted. On
//! cancellation the worker returns at once; slot tasks are aborted and
//! whatever they would have delivered is lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::cycle::run_cycle;
use super::runner::BenchConfig;
use super::stats::{HistogramStat, RequestOutcome};
use crate::client::HttpClient;
use crate::errors::{QuickError, Result};
use crate::request::RequestFactory;

/// Drive one connection for the configured duration
pub async fn run_connection<C: HttpClient>(
    client: Arc<C>,
    requests: Arc<RequestFactory>,
    config: BenchConfig,
    cancel: CancellationToken,
) -> Result<HistogramStat> {
    let mut stat = HistogramStat::new(config.duration)?;
    let slots = config.requests_per_connection;

    let (tx, mut rx) = mpsc::channel::<Result<RequestOutcome>>(slots * 2);
    let draining = Arc::new(AtomicBool::new(false));

    let mut tasks = JoinSet::new();
    for _ in 0..slots {
        let client = client.clone();
        let requests = requests.clone();
        let tx = tx.clone();
        let draining = draining.clone();
        tasks.spawn(async move {
            while !draining.load(Ordering::Acquire) {
                let outcome = run_cycle(client.as_ref(), &requests).await;
                let fatal = outcome.is_err();
                if tx.send(outcome).await.is_err() || fatal {
                    break;
                }
            }
        });
    }
    // the channel closes once every slot has exited
    drop(tx);

    let deadline = tokio::time::sleep(config.duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("worker cancelled");
                tasks.abort_all();
                return Ok(stat);
            }
            _ = &mut deadline, if !draining.load(Ordering::Acquire) => {
                trace!("deadline reached, draining");
                draining.store(true, Ordering::Release);
            }
            item = rx.recv() => match item {
                Some(outcome) => stat.record(&outcome?),
                None => break,
            },
        }
    }

    // every slot has exited; surface any that panicked
    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| QuickError::Worker(e.to_string()))?;
    }

    Ok(stat)
}
